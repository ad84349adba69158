use tracing::Level;
use tracing_subscriber::{
    filter::Targets,
    fmt::{
        self,
        format::{Format, Full},
        time::SystemTime,
    },
    prelude::*,
};

/// Where a tool writes its logs. Each subcommand gets its own file so that
/// migration output is not interleaved with smoke-test output.
pub struct LogConfig<'a> {
    pub base_log_dir: &'a str,
    pub tool: &'a str,
}

impl LogConfig<'_> {
    fn file_name(&self) -> String {
        format!("finance-tools-{}.log", self.tool)
    }
}

fn build_base_log_format() -> Format<Full, SystemTime> {
    fmt::format()
        .with_level(true)
        .with_ansi(false)
        .with_file(true)
        .with_target(true)
        .with_thread_names(true)
}

fn build_filter() -> Targets {
    Targets::new()
        .with_target("sqlx", Level::WARN)
        .with_target("hyper_util", Level::INFO)
        .with_target("reqwest", Level::INFO)
        .with_default(Level::DEBUG)
}

pub fn setup_logging(config: &LogConfig) {
    let stdout_layer =
        tracing_subscriber::fmt::layer().event_format(build_base_log_format().with_ansi(true));

    let subscriber = tracing_subscriber::registry()
        .with(build_filter())
        .with(stdout_layer);

    if !config.base_log_dir.is_empty() {
        let log_file_layer = tracing_subscriber::fmt::layer()
            .event_format(build_base_log_format())
            .with_writer(tracing_appender::rolling::daily(
                config.base_log_dir,
                config.file_name(),
            ));
        let json_file_layer = tracing_subscriber::fmt::layer()
            .event_format(build_base_log_format().json())
            .with_writer(tracing_appender::rolling::daily(
                format!("{}/structured", config.base_log_dir),
                config.file_name(),
            ));
        subscriber.with(log_file_layer).with(json_file_layer).init();
    } else {
        subscriber.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_includes_tool() {
        let config = LogConfig {
            base_log_dir: "/tmp/logs",
            tool: "migrate",
        };
        assert_eq!(config.file_name(), "finance-tools-migrate.log");
    }
}
