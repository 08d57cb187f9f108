use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use gpu_headless::Context as _;
use gpu_headless::{logging, Api, Backend, Config, HeadlessConfig};
use std::path::PathBuf;

fn main() -> Result<()> {
    let matches = Command::new("headless_probe")
        .about("Creates a headless GPU context and prints its native descriptor")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML or RON configuration file"),
        )
        .arg(
            Arg::new("backend")
                .short('b')
                .long("backend")
                .value_name("NAME")
                .help("Backend to try (metal, gl, vulkan, d3d12); repeat to set the order")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("validation")
                .long("validation")
                .help("Request API validation layers")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log filter used when RUST_LOG is unset"),
        )
        .arg(
            Arg::new("save-config")
                .long("save-config")
                .value_name("FILE")
                .help("Write the effective configuration to FILE and exit"),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .help("List the backends compiled into this build and exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => HeadlessConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {path}"))?,
        None => HeadlessConfig::new("headless_probe"),
    };

    if let Some(names) = matches.get_many::<String>("backend") {
        let backends = names
            .map(|name| name.parse::<Backend>())
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid --backend")?;
        config = config.with_backends(backends);
    }
    if matches.get_flag("validation") {
        config = config.with_validation(true);
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config = config.with_log_level(level.as_str());
    }

    logging::init_with_level(&config.log_level);

    if matches.get_flag("list") {
        for backend in Backend::compiled() {
            println!("{backend}");
        }
        return Ok(());
    }

    if let Some(path) = matches.get_one::<String>("save-config") {
        let path = PathBuf::from(path);
        config
            .save_to_file(&path)
            .with_context(|| format!("Failed to save configuration to {}", path.display()))?;
        println!("Saved configuration to {}", path.display());
        return Ok(());
    }

    probe(&config)
}

fn probe(config: &HeadlessConfig) -> Result<()> {
    let mut ctx = gpu_headless::new_context_with(config).context("No headless context could be created")?;
    log::info!("Probing {} context", ctx.backend());

    let bound = ctx.make_current();
    print_descriptor(&ctx.api());
    ctx.release_current();
    ctx.release();

    bound.context("Context was created but could not be made current")?;
    Ok(())
}

fn print_descriptor(api: &Api) {
    println!("backend:      {}", api.backend());
    match *api {
        Api::Metal { device, queue, .. } | Api::Direct3D12 { device, queue, .. } => {
            println!("device:       {device:?}");
            println!("queue:        {queue:?}");
        }
        Api::OpenGl { display, context, .. } => {
            println!("display:      {display:?}");
            println!("context:      {context:?}");
        }
        Api::Vulkan {
            instance,
            physical_device,
            device,
            queue,
            queue_family,
            queue_index,
            ..
        } => {
            println!("instance:     {instance:?}");
            println!("physical:     {physical_device:?}");
            println!("device:       {device:?}");
            println!("queue:        {queue:?} (family {queue_family}, index {queue_index})");
        }
    }
    println!("pixel format: {:#x}", api.pixel_format());
}
