use crate::config::{
    Config, DEFAULT_LISTEN, DEFAULT_OBJECT_PATH, DEFAULT_PROC_ROOT, DEFAULT_UPROBE_SYMBOL,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "iowatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "eBPF observer for write/send activity of a single process", long_about = None)]
pub struct Cli {
    #[arg(short, long, help = "Target process PID", allow_negative_numbers = true)]
    pub pid: i64,

    #[arg(short, long, default_value_t = DEFAULT_LISTEN, help = "Prometheus listen address")]
    pub listen: SocketAddr,

    #[arg(long, default_value = DEFAULT_OBJECT_PATH, help = "Compiled eBPF object")]
    pub object: PathBuf,

    #[arg(long, default_value = DEFAULT_UPROBE_SYMBOL, help = "Symbol for the user-function probe")]
    pub symbol: String,

    #[arg(long, default_value = DEFAULT_PROC_ROOT, hide = true)]
    pub proc_root: PathBuf,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,
}

impl Cli {
    pub fn config(&self) -> Config {
        Config {
            pid: self.pid,
            listen: self.listen,
            object_path: self.object.clone(),
            uprobe_symbol: self.symbol.clone(),
            proc_root: self.proc_root.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_everything_but_pid() {
        let cli = Cli::try_parse_from(["iowatch", "--pid", "77"]).unwrap();
        let config = cli.config();

        assert_eq!(config.pid, 77);
        assert_eq!(config.listen, DEFAULT_LISTEN);
        assert_eq!(config.listen.to_string(), "0.0.0.0:9100");
        assert_eq!(config.object_path, PathBuf::from(DEFAULT_OBJECT_PATH));
        assert_eq!(config.uprobe_symbol, DEFAULT_UPROBE_SYMBOL);
        assert!(!cli.verbose);
    }

    #[test]
    fn pid_is_required() {
        assert!(Cli::try_parse_from(["iowatch"]).is_err());
    }

    #[test]
    fn negative_pid_parses_and_fails_validation() {
        let cli = Cli::try_parse_from(["iowatch", "--pid", "-3", "-l", "127.0.0.1:9200"]).unwrap();
        assert_eq!(cli.listen.port(), 9200);
        assert!(cli.config().validate().is_err());
    }
}
