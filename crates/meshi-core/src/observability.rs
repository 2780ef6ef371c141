//! Observability - tracing の初期化
//!
//! `RUST_LOG` があればそれに従い、無ければ `meshi_core=info,meshi=info`。
//! `json = true` で 1 行 1 JSON の出力にする（ログ収集基盤向け）。

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "meshi_core=info,meshi=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// 2 回目以降の呼び出しは何もしない
pub fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_tracing(false);
        init_tracing(true);
    }
}
