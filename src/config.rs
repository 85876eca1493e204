use ini::Ini;
use log::{LevelFilter, info, warn};
use std::str::FromStr;
use std::sync::Mutex;

const CONFIG_PATH: &str = "hardpoly.ini";
const OPTIONS: Option<&str> = Some("Options");
const MAX_PRODUCER_THREADS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    pub const fn as_level_filter(&self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::Off,
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub log_level: LogLevel,
    pub window_width: u32,
    pub window_height: u32,
    pub vsync: bool,
    pub gfx_debug: bool,
    /// 0 picks the machine's available parallelism.
    pub producer_threads: usize,
    pub glob_vis: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Warn,
            window_width: 1280,
            window_height: 800,
            vsync: true,
            gfx_debug: false,
            producer_threads: 0,
            glob_vis: 1638.4,
        }
    }
}

impl Config {
    /// Number of draw producers the viewer starts, never 0.
    pub fn producer_threads(&self) -> usize {
        let wanted = if self.producer_threads == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            self.producer_threads
        };
        wanted.clamp(1, MAX_PRODUCER_THREADS)
    }
}

// Global, mutable configuration instance.
static CONFIG: std::sync::LazyLock<Mutex<Config>> =
    std::sync::LazyLock::new(|| Mutex::new(Config::default()));

// --- File I/O ---

fn default_file_contents() -> String {
    let default = Config::default();
    let mut content = String::new();

    // [Options] section - keys in alphabetical order
    content.push_str("[Options]\n");
    content.push_str(&format!(
        "GfxDebug={}\n",
        if default.gfx_debug { "1" } else { "0" }
    ));
    content.push_str(&format!("GlobVis={}\n", default.glob_vis));
    content.push_str(&format!("LogLevel={}\n", default.log_level.as_str()));
    content.push_str(&format!("ProducerThreads={}\n", default.producer_threads));
    content.push_str(&format!("Vsync={}\n", if default.vsync { "1" } else { "0" }));
    content.push_str(&format!("WindowHeight={}\n", default.window_height));
    content.push_str(&format!("WindowWidth={}\n", default.window_width));
    content
}

fn create_default_config_file() -> Result<(), std::io::Error> {
    info!("'{CONFIG_PATH}' not found, creating with default values.");
    std::fs::write(CONFIG_PATH, default_file_contents())
}

fn parse_flag(conf: &Ini, key: &str, default: bool) -> bool {
    conf.get_from(OPTIONS, key)
        .and_then(|v| v.trim().parse::<u8>().ok())
        .map_or(default, |v| v != 0)
}

fn parse_value<T: FromStr>(conf: &Ini, key: &str, default: T) -> T {
    conf.get_from(OPTIONS, key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Builds a config from `[Options]`; each missing or malformed key keeps
/// its default.
fn from_ini(conf: &Ini) -> Config {
    let default = Config::default();
    Config {
        log_level: parse_value(conf, "LogLevel", default.log_level),
        window_width: parse_value(conf, "WindowWidth", default.window_width).max(1),
        window_height: parse_value(conf, "WindowHeight", default.window_height).max(1),
        vsync: parse_flag(conf, "Vsync", default.vsync),
        gfx_debug: parse_flag(conf, "GfxDebug", default.gfx_debug),
        producer_threads: parse_value(conf, "ProducerThreads", default.producer_threads),
        glob_vis: parse_value(conf, "GlobVis", default.glob_vis),
    }
}

pub fn load() {
    if !std::path::Path::new(CONFIG_PATH).exists()
        && let Err(e) = create_default_config_file()
    {
        warn!("Failed to create default config file: {e}");
    }

    match Ini::load_from_file(CONFIG_PATH) {
        Ok(conf) => {
            let loaded = from_ini(&conf);
            *CONFIG.lock().unwrap_or_else(|e| e.into_inner()) = loaded;
            info!("Configuration loaded from '{CONFIG_PATH}'.");
        }
        Err(e) => {
            warn!("Failed to load '{CONFIG_PATH}': {e}. Using default values.");
        }
    }
}

pub fn get() -> Config {
    *CONFIG.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Config {
        let conf = Ini::load_from_str(text).expect("test ini should parse");
        from_ini(&conf)
    }

    #[test]
    fn default_file_round_trips_to_defaults() {
        assert_eq!(parse(&default_file_contents()), Config::default());
    }

    #[test]
    fn keys_are_read_from_options_section() {
        let cfg = parse(
            "[Options]\nLogLevel=Debug\nWindowWidth=640\nWindowHeight=400\nVsync=0\nGfxDebug=1\nProducerThreads=3\nGlobVis=800.5\n",
        );
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!((cfg.window_width, cfg.window_height), (640, 400));
        assert!(!cfg.vsync);
        assert!(cfg.gfx_debug);
        assert_eq!(cfg.producer_threads(), 3);
        assert_eq!(cfg.glob_vis, 800.5);
    }

    #[test]
    fn malformed_keys_fall_back_individually() {
        let cfg = parse("[Options]\nLogLevel=loud\nWindowWidth=wide\nWindowHeight=0\nVsync=yes\n");
        let default = Config::default();
        assert_eq!(cfg.log_level, default.log_level);
        assert_eq!(cfg.window_width, default.window_width);
        assert_eq!(cfg.window_height, 1, "zero size is clamped");
        assert_eq!(cfg.vsync, default.vsync);
    }

    #[test]
    fn keys_outside_options_are_ignored() {
        let cfg = parse("[Other]\nWindowWidth=320\n");
        assert_eq!(cfg.window_width, Config::default().window_width);
    }

    #[test]
    fn producer_threads_are_clamped() {
        let mut cfg = Config::default();
        cfg.producer_threads = 64;
        assert_eq!(cfg.producer_threads(), MAX_PRODUCER_THREADS);
        cfg.producer_threads = 0;
        let auto = cfg.producer_threads();
        assert!((1..=MAX_PRODUCER_THREADS).contains(&auto));
    }

    #[test]
    fn log_levels_parse_case_insensitively() {
        for level in [
            LogLevel::Off,
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert_eq!(LogLevel::from_str(&level.as_str().to_uppercase()), Ok(level));
        }
        assert_eq!(LogLevel::Info.as_level_filter(), LevelFilter::Info);
    }
}
