//! HotPepperSite - 掲載サイトの取得と抽出
//!
//! # 構成
//! - HTTP 取得は `HotPepperSite`（reqwest）
//! - 抽出は HTML 文字列を受け取る純粋関数（`parse_*`）。テストは固定 HTML で行う
//!
//! # 方針
//! 期待したマークアップが無ければ `ExtractError::Missing`、あるが形が違えば
//! `ExtractError::Pattern`。既定値で埋めて先へ進むことはしない
//! （サイト側の変更を黙って 0 件として扱わないため）。

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::domain::area::AreaPath;
use crate::domain::errors::ExtractError;
use crate::domain::restaurant::{DetailInfo, ImageRef, ListingEntry};
use crate::ports::ListingSite;

static PAGE_COUNT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"1/([0-9]+)ページ").ok());
static STORE_LINK: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"/str(J[0-9]+)/").ok());

fn selector(css: &'static str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Pattern {
        what: "css selector",
        text: format!("{css}: {e:?}"),
    })
}

fn pattern(
    re: &'static LazyLock<Option<Regex>>,
    what: &'static str,
) -> Result<&'static Regex, ExtractError> {
    re.as_ref().ok_or_else(|| ExtractError::Pattern {
        what,
        text: "pattern failed to compile".to_string(),
    })
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// 一覧 1 ページ目の「1/N ページ」から N を読む
///
/// 表記が無い・数字として読めない場合はエラー（1 ページとみなさない）。
pub fn parse_page_count(html: &str, url: &str) -> Result<u32, ExtractError> {
    let document = Html::parse_document(html);
    let marker = document
        .select(&selector(".searchResultPageLink .lh27")?)
        .next()
        .ok_or_else(|| ExtractError::Missing {
            what: ".searchResultPageLink .lh27",
            url: url.to_string(),
        })?;
    let text = text_of(marker);
    let mismatch = || ExtractError::Pattern {
        what: "1/Nページ",
        text: text.clone(),
    };
    let captures = pattern(&PAGE_COUNT, "1/Nページ")?
        .captures(&text)
        .ok_or_else(mismatch)?;
    let count: u32 = captures[1].parse().map_err(|_| mismatch())?;
    if count == 0 {
        return Err(mismatch());
    }
    Ok(count)
}

/// 一覧ページから店舗 ID・名前・サムネイル URL を抜く
pub fn parse_abstracts(html: &str, url: &str) -> Result<Vec<ListingEntry>, ExtractError> {
    let document = Html::parse_document(html);
    let cards: Vec<ElementRef<'_>> = document
        .select(&selector(".shopDetailCoreInner")?)
        .collect();
    if cards.is_empty() {
        return Err(ExtractError::Missing {
            what: ".shopDetailCoreInner",
            url: url.to_string(),
        });
    }

    let thumbnail = selector(".shopPhotoMain img")?;
    let store_name = selector(".shopDetailStoreName a")?;
    let store_link = pattern(&STORE_LINK, "/strJ.../")?;

    cards
        .into_iter()
        .map(|card| {
            let link = card
                .select(&store_name)
                .next()
                .ok_or_else(|| ExtractError::Missing {
                    what: ".shopDetailStoreName a",
                    url: url.to_string(),
                })?;
            let href = link.value().attr("href").unwrap_or_default();
            let id = store_link
                .captures(href)
                .map(|c| c[1].to_string())
                .ok_or_else(|| ExtractError::Pattern {
                    what: "/strJ.../",
                    text: href.to_string(),
                })?;
            let thumbnail_url = card
                .select(&thumbnail)
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(str::to_string);
            Ok(ListingEntry {
                id,
                name: text_of(link),
                thumbnail_url,
            })
        })
        .collect()
}

/// 詳細ページからジャンル・住所・営業時間・定休日・駐車場を抜く
///
/// 営業時間と定休日は改行タグを残すため inner HTML のまま保持する。
pub fn parse_detail(html: &str, url: &str) -> Result<DetailInfo, ExtractError> {
    let document = Html::parse_document(html);
    let mut info = DetailInfo::default();

    let blocks: Vec<ElementRef<'_>> = document
        .select(&selector(".jscShopInfoInnerSection .shopInfoInnerSectionBlock")?)
        .collect();
    if blocks.is_empty() {
        return Err(ExtractError::Missing {
            what: ".shopInfoInnerSectionBlock",
            url: url.to_string(),
        });
    }
    let dt = selector("dt")?;
    let item = selector(".shopInfoInnerItemTitle")?;
    let anchor = selector("a")?;
    for block in blocks {
        let title = block.select(&dt).next().ok_or_else(|| ExtractError::Missing {
            what: ".shopInfoInnerSectionBlock dt",
            url: url.to_string(),
        })?;
        if text_of(title) != "ジャンル" {
            continue;
        }
        // 1 つ目がジャンル、2 つ目があればサブジャンル
        let items: Vec<ElementRef<'_>> = block.select(&item).collect();
        let Some(first) = items.first() else {
            return Err(ExtractError::Missing {
                what: ".shopInfoInnerItemTitle",
                url: url.to_string(),
            });
        };
        let link = first.select(&anchor).next().ok_or_else(|| ExtractError::Missing {
            what: ".shopInfoInnerItemTitle a",
            url: url.to_string(),
        })?;
        info.genre = text_of(link);

        if let Some(second) = items.get(1) {
            let link = second.select(&anchor).next().ok_or_else(|| ExtractError::Missing {
                what: "sub genre .shopInfoInnerItemTitle a",
                url: url.to_string(),
            })?;
            info.sub_genre = Some(text_of(link));
        }
    }

    let tables: Vec<ElementRef<'_>> = document.select(&selector(".infoTable")?).collect();
    if tables.is_empty() {
        return Err(ExtractError::Missing {
            what: ".infoTable",
            url: url.to_string(),
        });
    }
    let tr = selector("tr")?;
    let th = selector("th")?;
    let td = selector("td")?;
    for table in tables {
        let summary = table.value().attr("summary").unwrap_or_default();
        if summary != "お店情報" && summary != "設備" {
            continue;
        }
        for row in table.select(&tr) {
            let Some(header) = row.select(&th).next() else {
                return Err(ExtractError::Missing {
                    what: ".infoTable th",
                    url: url.to_string(),
                });
            };
            let label = text_of(header);
            if !matches!(label.as_str(), "住所" | "営業時間" | "定休日" | "駐車場") {
                continue;
            }
            let cell = row.select(&td).next().ok_or_else(|| ExtractError::Missing {
                what: ".infoTable td",
                url: url.to_string(),
            })?;
            match label.as_str() {
                "住所" => info.address = text_of(cell),
                "営業時間" => info.open_hours = cell.inner_html().trim().to_string(),
                "定休日" => info.close_days = cell.inner_html().trim().to_string(),
                _ => info.parking = text_of(cell),
            }
        }
    }
    Ok(info)
}

/// 写真ページの画像一覧
///
/// `.jsc-photo-list`（相対パスのことがある）と `.jsc-photo-list-elm` の両方を見る。
/// どちらも無ければエラー。
pub fn parse_photos(html: &str, url: &str, base_url: &str) -> Result<Vec<ImageRef>, ExtractError> {
    let document = Html::parse_document(html);
    let list: Vec<ElementRef<'_>> = document.select(&selector(".jsc-photo-list")?).collect();
    let elms: Vec<ElementRef<'_>> = document
        .select(&selector(".jsc-photo-list-elm")?)
        .collect();
    if list.is_empty() && elms.is_empty() {
        return Err(ExtractError::Missing {
            what: ".jsc-photo-list",
            url: url.to_string(),
        });
    }

    let base = base_url.trim_end_matches('/');
    list.into_iter()
        .chain(elms)
        .map(|element| {
            let src = element
                .value()
                .attr("data-src")
                .ok_or_else(|| ExtractError::Pattern {
                    what: "data-src",
                    text: element.html(),
                })?;
            let url = if src.starts_with("https://") || src.starts_with("http://") {
                src.to_string()
            } else {
                format!("{base}{src}")
            };
            Ok(ImageRef {
                url,
                alt: element.value().attr("data-alt").unwrap_or_default().to_string(),
            })
        })
        .collect()
}

pub struct HotPepperSite {
    client: reqwest::Client,
    base_url: String,
    request_delay: Duration,
}

impl HotPepperSite {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, request_delay: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_delay,
        }
    }

    pub fn listing_url(&self, area: &AreaPath, page: u32) -> String {
        format!(
            "{}/{}/{}/{}/bgn{page}/",
            self.base_url, area.service_area_code, area.middle_area_code, area.small_area_code
        )
    }

    /// (status, body)。ステータスの判断は呼び出し側
    async fn get(&self, url: &str) -> Result<(u16, String), ExtractError> {
        let http = |e: reqwest::Error| ExtractError::Http {
            url: url.to_string(),
            source: Box::new(e),
        };
        let response = self.client.get(url).send().await.map_err(http)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(http)?;
        tracing::debug!(url, status, bytes = body.len(), "page fetched");
        Ok((status, body))
    }

    async fn get_ok(&self, url: &str) -> Result<String, ExtractError> {
        let (status, body) = self.get(url).await?;
        if status != 200 {
            return Err(ExtractError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl ListingSite for HotPepperSite {
    async fn page_count(&self, area: &AreaPath) -> Result<u32, ExtractError> {
        let url = self.listing_url(area, 1);
        let html = self.get_ok(&url).await?;
        parse_page_count(&html, &url)
    }

    async fn abstracts(&self, area: &AreaPath, page: u32) -> Result<Vec<ListingEntry>, ExtractError> {
        let url = self.listing_url(area, page);
        let html = self.get_ok(&url).await?;
        parse_abstracts(&html, &url)
    }

    async fn detail(&self, id: &str) -> Result<DetailInfo, ExtractError> {
        let url = format!("{}/str{id}", self.base_url);
        let html = self.get_ok(&url).await?;
        let mut info = parse_detail(&html, &url)?;

        tokio::time::sleep(self.request_delay).await;

        // 写真ページが 200 以外なら写真なし
        let photo_url = format!("{}/str{id}/photo/", self.base_url);
        let (status, body) = self.get(&photo_url).await?;
        if status == 200 {
            info.images = parse_photos(&body, &photo_url, &self.base_url)?;
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::area::sample_area;
    use rstest::rstest;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LISTING: &str = r#"<html><body>
        <div class="searchResultPageLink"><p class="lh27">1/3ページ</p></div>
        <div class="shopDetailCoreInner">
          <div class="shopPhotoMain"><img src="https://imgfp.hotp.jp/a.jpg"></div>
          <h3 class="shopDetailStoreName"><a href="/strJ001234567/">  炭火焼 鳥よし  </a></h3>
        </div>
        <div class="shopDetailCoreInner">
          <h3 class="shopDetailStoreName"><a href="/strJ000000002/">酒場 二号</a></h3>
        </div>
    </body></html>"#;

    const DETAIL: &str = r#"<html><body>
        <div class="jscShopInfoInnerSection">
          <dl class="shopInfoInnerSectionBlock"><dt>予算</dt><dd>3000円</dd></dl>
          <dl class="shopInfoInnerSectionBlock"><dt>ジャンル</dt>
            <dd>
              <p class="shopInfoInnerItemTitle"><a href="/genre/G001">居酒屋</a></p>
              <p class="shopInfoInnerItemTitle"><a href="/genre/G004"> 和食 </a></p>
            </dd></dl>
        </div>
        <table class="infoTable" summary="お店情報">
          <tr><th>住所</th><td> 東京都千代田区丸の内1-1 </td></tr>
          <tr><th>営業時間</th><td>17:00～23:00<br>日曜休み</td></tr>
          <tr><th>定休日</th><td>日</td></tr>
        </table>
        <table class="infoTable" summary="設備">
          <tr><th>駐車場</th><td>なし</td></tr>
        </table>
        <table class="infoTable" summary="その他"><tr><th>住所</th><td>無視される</td></tr></table>
    </body></html>"#;

    #[test]
    fn page_count_is_read_from_the_marker() {
        assert_eq!(parse_page_count(LISTING, "u").unwrap(), 3);
    }

    #[rstest]
    #[case("<html><body><p>no marker</p></body></html>")]
    #[case(r#"<div class="searchResultPageLink"><p class="lh27">全件表示</p></div>"#)]
    #[case(r#"<div class="searchResultPageLink"><p class="lh27">1/ページ</p></div>"#)]
    #[case(r#"<div class="searchResultPageLink"><p class="lh27">1/99999999999ページ</p></div>"#)]
    fn page_count_never_defaults(#[case] html: &str) {
        assert!(parse_page_count(html, "u").is_err());
    }

    #[test]
    fn abstracts_carry_id_name_and_thumbnail() {
        let entries = parse_abstracts(LISTING, "u").unwrap();
        assert_eq!(
            entries,
            vec![
                ListingEntry {
                    id: "J001234567".to_string(),
                    name: "炭火焼 鳥よし".to_string(),
                    thumbnail_url: Some("https://imgfp.hotp.jp/a.jpg".to_string()),
                },
                ListingEntry {
                    id: "J000000002".to_string(),
                    name: "酒場 二号".to_string(),
                    thumbnail_url: None,
                },
            ]
        );
    }

    #[test]
    fn listing_without_cards_or_with_bad_links_fails() {
        assert!(matches!(
            parse_abstracts("<html></html>", "u"),
            Err(ExtractError::Missing { .. })
        ));
        let bad = r#"<div class="shopDetailCoreInner"><div class="shopDetailStoreName"><a href="/about/">x</a></div></div>"#;
        assert!(matches!(
            parse_abstracts(bad, "u"),
            Err(ExtractError::Pattern { .. })
        ));
    }

    #[test]
    fn detail_fields_are_extracted() {
        let info = parse_detail(DETAIL, "u").unwrap();
        assert_eq!(info.genre, "居酒屋");
        assert_eq!(info.address, "東京都千代田区丸の内1-1");
        assert_eq!(info.open_hours, "17:00～23:00<br>日曜休み");
        assert_eq!(info.close_days, "日");
        assert_eq!(info.parking, "なし");
        assert_eq!(info.sub_genre.as_deref(), Some("和食"));
    }

    #[test]
    fn single_genre_item_has_no_sub_genre() {
        let html = DETAIL.replace(
            r#"<p class="shopInfoInnerItemTitle"><a href="/genre/G004"> 和食 </a></p>"#,
            "",
        );
        let info = parse_detail(&html, "u").unwrap();
        assert_eq!(info.genre, "居酒屋");
        assert_eq!(info.sub_genre, None);
    }

    #[rstest]
    #[case::no_items(r#"<dd><span>居酒屋</span></dd>"#, ".shopInfoInnerItemTitle")]
    #[case::genre_without_link(
        r#"<dd><p class="shopInfoInnerItemTitle">居酒屋</p></dd>"#,
        ".shopInfoInnerItemTitle a"
    )]
    #[case::sub_genre_without_link(
        r#"<dd><p class="shopInfoInnerItemTitle"><a>居酒屋</a></p><p class="shopInfoInnerItemTitle">和食</p></dd>"#,
        "sub genre .shopInfoInnerItemTitle a"
    )]
    fn broken_genre_markup_fails(#[case] dd: &str, #[case] missing: &str) {
        let html = format!(
            r#"<div class="jscShopInfoInnerSection"><dl class="shopInfoInnerSectionBlock"><dt>ジャンル</dt>{dd}</dl></div>
            <table class="infoTable" summary="お店情報"><tr><th>住所</th><td>東京都</td></tr></table>"#
        );
        let err = parse_detail(&html, "u").unwrap_err();
        assert!(matches!(err, ExtractError::Missing { what, .. } if what == missing), "{err:?}");
    }

    #[test]
    fn detail_without_info_table_fails() {
        let html = r#"<div class="jscShopInfoInnerSection"><dl class="shopInfoInnerSectionBlock"><dt>ジャンル</dt></dl></div>"#;
        assert!(parse_detail(html, "u").is_err());
    }

    #[test]
    fn photos_resolve_relative_paths() {
        let html = r#"
            <li class="jsc-photo-list" data-src="/photo/1.jpg" data-alt="外観"></li>
            <li class="jsc-photo-list-elm" data-src="https://imgfp.hotp.jp/2.jpg" data-alt="料理"></li>"#;
        let images = parse_photos(html, "u", "https://www.hotpepper.jp/").unwrap();
        assert_eq!(images[0].url, "https://www.hotpepper.jp/photo/1.jpg");
        assert_eq!(images[0].alt, "外観");
        assert_eq!(images[1].url, "https://imgfp.hotp.jp/2.jpg");
        assert!(parse_photos("<html></html>", "u", "b").is_err());
    }

    #[tokio::test]
    async fn site_fetches_listing_and_treats_missing_photos_as_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/SA11/Y005/X005/bgn1/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/strJ001234567"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DETAIL))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/strJ001234567/photo/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let site = HotPepperSite::new(reqwest::Client::new(), server.uri(), Duration::ZERO);
        let area = sample_area();
        assert_eq!(site.page_count(&area).await.unwrap(), 3);
        assert_eq!(site.abstracts(&area, 1).await.unwrap().len(), 2);

        let detail = site.detail("J001234567").await.unwrap();
        assert_eq!(detail.genre, "居酒屋");
        assert!(detail.images.is_empty());
    }

    #[tokio::test]
    async fn server_errors_surface_as_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let site = HotPepperSite::new(reqwest::Client::new(), server.uri(), Duration::ZERO);
        assert!(matches!(
            site.page_count(&sample_area()).await,
            Err(ExtractError::Status { status: 503, .. })
        ));
    }
}
