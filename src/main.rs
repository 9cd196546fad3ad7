//! support-rag 서비스 진입점

use anyhow::Result;

fn main() -> Result<()> {
    // 로깅 초기화
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // 설정은 시작 시 한 번만 읽음
    let settings = support_rag::Settings::from_env()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(support_rag::server::run(settings))
}
