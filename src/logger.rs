use log::LevelFilter;
use std::env;

fn do_init(level: Option<LevelFilter>) {
	use chrono::Local;
	use env_logger::{fmt::style::Style, Builder};
	use std::io::Write;

	let mut logger = Builder::from_default_env();
	logger.format(|buf, record| {
		let level_style = buf.default_level_style(record.level());
		let dim = Style::new().dimmed();

		writeln!(
			buf,
			"{dim}[{}{dim:#} {level_style}{: <5}{level_style:#} {dim}{}]{dim:#} {}",
			Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
			record.level(),
			record.target(),
			record.args()
		)
	});

	if let Some(level) = level {
		logger.filter_level(level);
	}

	// a second init (tests) keeps the first logger
	let _ = logger.try_init();
}

/// `RUST_LOG` wins; otherwise the configured level applies.
pub fn init_logger(level: LevelFilter) {
	match env::var_os("RUST_LOG") {
		Some(_) => do_init(None),
		None => do_init(Some(level)),
	}
}
