//! ListingSite port - 掲載サイトからの取得と抽出
//!
//! core から見ると「ページを取ってきてフィールドを抜く」黒箱です。
//! 期待したマークアップが無いときは `ExtractError` を返し、
//! 既定値で埋めることはしません。

use async_trait::async_trait;

use crate::domain::area::AreaPath;
use crate::domain::errors::ExtractError;
use crate::domain::restaurant::{DetailInfo, ListingEntry};

#[async_trait]
pub trait ListingSite: Send + Sync {
    /// 一覧 1 ページ目の「1/N ページ」表記から N を読む
    async fn page_count(&self, area: &AreaPath) -> Result<u32, ExtractError>;

    /// 一覧ページ `page` に載っている店舗
    async fn abstracts(&self, area: &AreaPath, page: u32)
    -> Result<Vec<ListingEntry>, ExtractError>;

    /// 店舗詳細ページと写真ページ
    async fn detail(&self, id: &str) -> Result<DetailInfo, ExtractError>;
}
