use anyhow::Result;

mod app;
mod logging;

fn main() -> Result<()> {
    let args = preserve_paths::cli::parse();
    app::run(args)
}
