//! Tracing setup
//!
//! Logs go to stderr; stdout carries the MCP protocol. `RUST_LOG` filters
//! as usual (default `<crate>=info`) and `LOG_FORMAT=json` switches to
//! structured output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub fn init_tracing(crate_name: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(format!("{}=info", crate_name).parse()?);

    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let output = if wants_json(std::env::var("LOG_FORMAT").ok().as_deref()) {
        fmt.json().boxed()
    } else {
        fmt.with_ansi(false).boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()?;

    Ok(())
}

fn wants_json(log_format: Option<&str>) -> bool {
    log_format.is_some_and(|v| v.eq_ignore_ascii_case("json"))
}
