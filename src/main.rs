use tonutils_cell::cli::Cli;
use tonutils_cell::utils::init_logger;

fn main() -> anyhow::Result<()> {
    init_logger()?;
    let cli = Cli::parse_args();
    cli.execute()
}
