use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cfg = gomuks_native::config::Config::parse();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(gomuks_native::run(cfg))
}
