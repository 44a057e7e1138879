//! Logging configuration for lnd-fleet
//!
//! Uses log4rs with appenders:
//! 1. ConsoleAppender - stderr output, so command results on stdout stay clean
//! 2. RollingFileAppender - log files with rotation (only when a log dir is given)

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::Path;

/// Initialize log4rs with a console appender and, if `log_dir` is set, a
/// rolling file appender.
///
/// # Log File Configuration
/// - File: `{log_dir}/lnd-fleet.1.log`
/// - Max size: 20 MB per file
/// - Max count: 10 files (rotation)
/// - Pattern: `{timestamp} [{level}] {target} - {message}`
pub fn init_logger(log_dir: Option<&Path>, level: LevelFilter) -> anyhow::Result<log4rs::Handle> {
    let config = build_config(log_dir, level)?;
    Ok(log4rs::init_config(config)?)
}

fn build_config(log_dir: Option<&Path>, level: LevelFilter) -> anyhow::Result<Config> {
    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build();

    let mut builder =
        Config::builder().appender(Appender::builder().build("console", Box::new(console)));
    let mut root = Root::builder().appender("console");

    if let Some(log_dir) = log_dir {
        std::fs::create_dir_all(log_dir)?;

        let log_file = log_dir.join("lnd-fleet.1.log");
        let log_pattern = log_dir.join("lnd-fleet.{}.log");
        let log_pattern = log_pattern
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("log directory is not valid UTF-8"))?;

        // Rolling file appender (20MB per file, 10 files max)
        let roller = FixedWindowRoller::builder().base(1).build(log_pattern, 10)?;
        let trigger = SizeTrigger::new(20 * 1024 * 1024);
        let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

        let logfile = RollingFileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(
                "{d(%Y-%m-%d %H:%M:%S)} [{l}] {t} - {m}{n}",
            )))
            .build(log_file, Box::new(policy))?;

        builder = builder.appender(Appender::builder().build("logfile", Box::new(logfile)));
        root = root.appender("logfile");
    }

    Ok(builder.build(root.build(level))?)
}
