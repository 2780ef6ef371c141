//! Geo - 矩形フィルタと球面距離
//!
//! 矩形判定は単純な範囲比較です。経度 180 度をまたぐ矩形や高緯度での
//! 経度幅の縮みは考慮しません（検索範囲は地図の表示範囲なので実用上は十分）。
//! 距離は並べ替えと表示のためだけに使います。

use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

impl BoundingBox {
    /// min と max が逆なら入れ替える（エラーにはしない）
    pub fn normalized(self) -> Self {
        let (lat_min, lat_max) = ordered(self.lat_min, self.lat_max);
        let (lng_min, lng_max) = ordered(self.lng_min, self.lng_max);
        Self {
            lat_min,
            lat_max,
            lng_min,
            lng_max,
        }
    }

    /// 境界を含む
    pub fn contains(&self, p: LatLng) -> bool {
        (self.lat_min..=self.lat_max).contains(&p.lat) && (self.lng_min..=self.lng_max).contains(&p.lng)
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a > b { (b, a) } else { (a, b) }
}

/// 球面余弦定理による大円距離（km）
///
/// 同一点付近では丸め誤差で acos の引数が 1 をわずかに超えるため [-1, 1] に収める。
pub fn distance_km(from: LatLng, to: LatLng) -> f64 {
    let (lat1, lng1) = (from.lat.to_radians(), from.lng.to_radians());
    let (lat2, lng2) = (to.lat.to_radians(), to.lng.to_radians());
    let cos_angle = lat1.cos() * lat2.cos() * (lng2 - lng1).cos() + lat1.sin() * lat2.sin();
    EARTH_RADIUS_KM * cos_angle.clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const TOKYO: LatLng = LatLng {
        lat: 35.681236,
        lng: 139.767125,
    };
    const OSAKA: LatLng = LatLng {
        lat: 34.702485,
        lng: 135.495951,
    };

    #[test]
    fn tokyo_to_osaka_is_about_400km() {
        let d = distance_km(TOKYO, OSAKA);
        assert!((395.0..410.0).contains(&d), "got {d}");
    }

    #[test]
    fn same_point_is_zero_not_nan() {
        let d = distance_km(TOKYO, TOKYO);
        assert!(d.abs() < 1e-6);
    }

    #[rstest]
    #[case(BoundingBox { lat_min: 36.0, lat_max: 35.0, lng_min: 139.0, lng_max: 140.0 })]
    #[case(BoundingBox { lat_min: 35.0, lat_max: 36.0, lng_min: 140.0, lng_max: 139.0 })]
    #[case(BoundingBox { lat_min: 36.0, lat_max: 35.0, lng_min: 140.0, lng_max: 139.0 })]
    fn inverted_boxes_are_swapped(#[case] input: BoundingBox) {
        let want = BoundingBox {
            lat_min: 35.0,
            lat_max: 36.0,
            lng_min: 139.0,
            lng_max: 140.0,
        };
        assert_eq!(input.normalized(), want);
        assert!(input.normalized().contains(TOKYO));
    }

    #[test]
    fn contains_is_inclusive() {
        let b = BoundingBox {
            lat_min: 35.0,
            lat_max: 36.0,
            lng_min: 139.0,
            lng_max: 140.0,
        };
        assert!(b.contains(LatLng::new(35.0, 140.0)));
        assert!(!b.contains(OSAKA));
    }
}
