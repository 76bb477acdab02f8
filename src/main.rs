fn main() -> anyhow::Result<()> {
    canrisk::cli::run()
}
