use clap::Parser;
use miette::Result;
use tcc::cli::{Cli, Commands};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    // TCC_LOG wins; otherwise warnings only, or debug with --verbose
    let filter = EnvFilter::try_from_env("TCC_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if global.verbose { "debug" } else { "warn" })
    });
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init(args) => tcc::cli::commands::init::run(args, &global),
        Commands::Eco(cmd) => tcc::cli::commands::eco::run(cmd, &global),
        Commands::Bom(cmd) => tcc::cli::commands::bom::run(cmd, &global),
        Commands::Rev(cmd) => tcc::cli::commands::rev::run(cmd, &global),
        Commands::Audit(cmd) => tcc::cli::commands::audit::run(cmd, &global),
        Commands::Team(cmd) => cmd.run(&global),
        Commands::Source(cmd) => tcc::cli::commands::source::run(cmd, &global),
        Commands::Completions(args) => tcc::cli::commands::completions::run(args),
    }
}
