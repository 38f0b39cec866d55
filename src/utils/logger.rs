use env_logger::{Builder, Target};
use log::LevelFilter;
use std::io::Write;

/// Installs the stdout logger used by the `lan-share` binary.
///
/// Defaults to `Info`; `RUST_LOG` overrides per module, e.g.
/// `RUST_LOG=lan_share::network=debug`.
pub fn setup_logging() {
    let mut builder = Builder::new();

    builder
        .target(Target::Stdout)
        .filter_level(LevelFilter::Info)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] [{}:{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    builder.init();
}
