use colored::{ColoredString, Colorize};

// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn header(self) -> ColoredString {
        let header = match self {
            Level::Info => "[INFO]".blue(),
            Level::Warn => "[WARN]".yellow(),
            Level::Error => "[ERROR]".red(),
        };
        header.on_truecolor(35, 38, 39).bold()
    }
}

// Print one line on stderr. Use the `log!` macro instead.
pub fn write(level: Level, msg: String) {
    let msg = match level {
        Level::Info => msg.green(),
        Level::Warn => msg.yellow(),
        Level::Error => msg.red(),
    };
    eprintln!("{} {}", level.header(), msg);
}

// Pretty prints the process logs.
//
//   log!(info, "tracker listening on {}", addr);
//   log!(warn, "chunk {} of {} has an invalid hash", index, name);
#[macro_export]
macro_rules! log {
    (info, $($args:tt)+) => {
        $crate::utils::log::write($crate::utils::log::Level::Info, format!($($args)+))
    };
    (warn, $($args:tt)+) => {
        $crate::utils::log::write($crate::utils::log::Level::Warn, format!($($args)+))
    };
    (error, $($args:tt)+) => {
        $crate::utils::log::write($crate::utils::log::Level::Error, format!($($args)+))
    };
}
