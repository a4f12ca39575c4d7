use bitaxe_asic::{AsicDriver, ChipFamily};
use bitaxe_core::config::{AppConfig, CliOverrides, Configuration, DEFAULT_CONFIG_PATH};
use bitaxe_core::supervisor::{build_core_tasks, initial_protocol, Shared};
use std::path::Path;
use std::process;

#[tokio::main]
async fn main() {
    let app = clap::App::new("bitaxed")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            clap::Arg::with_name("config")
                .long("config")
                .help("Set config file path")
                .required(false)
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("pool")
                .short("p")
                .long("pool")
                .value_name("SCHEME://HOSTNAME:PORT")
                .help("Override the primary pool URL")
                .required(false)
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("user")
                .short("u")
                .long("user")
                .value_name("USERNAME.WORKERNAME")
                .help("Override the primary pool username")
                .required(false)
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("disable-version-rolling")
                .long("disable-version-rolling")
                .help("Disable BIP320 version rolling (use just one midstate)")
                .required(false),
        )
        .arg(
            clap::Arg::with_name("frequency")
                .long("frequency")
                .help("Set chip frequency (in MHz)")
                .required(false)
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("voltage")
                .long("voltage")
                .help("Set chip core voltage (in mV)")
                .required(false)
                .takes_value(true),
        );

    let matches = app.get_matches();

    let config_path = matches.value_of("config").unwrap_or(DEFAULT_CONFIG_PATH);
    let file_config = match Configuration::load(Path::new(config_path)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config {config_path}: {err}");
            process::exit(1);
        }
    };

    let overrides = CliOverrides {
        pool_url: matches.value_of("pool").map(str::to_string),
        pool_user: matches.value_of("user").map(str::to_string),
        frequency_mhz: matches.value_of("frequency").and_then(|v| v.parse().ok()),
        voltage_mv: matches.value_of("voltage").and_then(|v| v.parse().ok()),
        disable_version_rolling: matches.is_present("disable-version-rolling"),
    };

    let app_config = match AppConfig::from_file(file_config, overrides) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            process::exit(1);
        }
    };

    let shared = std::sync::Arc::new(Shared::new(initial_protocol(&app_config)));
    // Device model selection fixes the ASIC chip family for bring-up boards;
    // production boards probe this over I2C instead.
    let chip_family = ChipFamily::Bm1370;
    let (job_builder, result_task) = build_core_tasks(chip_family, app_config.version_rolling);
    let _driver = AsicDriver::new(chip_family, shared.active_jobs.clone());
    let _ = (job_builder, result_task, shared);

    eprintln!("bitaxed configured for pool {}", app_config.primary_pool.url());
}
