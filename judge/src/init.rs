use log::LevelFilter;

use crate::config::Config;

/// setup logger and panic handler
///
/// a panic in any worker exits the whole process, a judge with a poisoned
/// worker must not keep accepting submissions
pub fn logger(config: &Config) {
    env_logger::Builder::new()
        .filter_module("judge", level(config))
        .try_init()
        .ok();

    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        log::error!(
            "panic at {}",
            info.location().map(|x| x.to_string()).unwrap_or_default()
        );
        std::process::exit(1);
    }));
}

fn level(config: &Config) -> LevelFilter {
    match config.log_level {
        #[cfg(debug_assertions)]
        0 => LevelFilter::Trace,
        #[cfg(not(debug_assertions))]
        0 => LevelFilter::Debug,
        1 => LevelFilter::Debug,
        2 => LevelFilter::Info,
        3 => LevelFilter::Warn,
        4 => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}
