fn main() -> anyhow::Result<()> {
    servicebay::cli::run_cli()
}
