use console::style;

use crate::config::AppConfig;
use crate::error::Result;

pub fn execute() -> Result<()> {
    let path = AppConfig::config_path()?;

    if path.exists() {
        println!(
            "{} Config already exists at {}",
            style("•").yellow(),
            path.display()
        );
        return Ok(());
    }

    let config = AppConfig::default();
    config.save()?;

    println!(
        "{} Wrote default config to {}",
        style("✓").green(),
        path.display()
    );
    println!(
        "  Place the distribution manifest at {}",
        config.manifest_path()?.display()
    );
    Ok(())
}
