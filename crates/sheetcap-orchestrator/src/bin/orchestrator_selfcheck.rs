use std::path::Path;
use std::process::Command;

use sheetcap_orchestrator::OrchestratorConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OrchestratorConfig::from_env();

    println!(
        "orchestrator-selfcheck: starting with jobs_dir={}",
        config.jobs_dir.display()
    );
    ensure_jobs_dir(&config.jobs_dir).await?;
    ensure_binary("ffmpeg")?;
    ensure_binary("ffprobe")?;

    println!("orchestrator-selfcheck: ok");
    Ok(())
}

async fn ensure_jobs_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path.as_ref()).await?;
    Ok(())
}

fn ensure_binary(name: &str) -> anyhow::Result<()> {
    let output = Command::new(name)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("{} -version failed: {:?}", name, output.status));
    }
    Ok(())
}
