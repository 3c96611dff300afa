use directories::ProjectDirs;
use std::path::PathBuf;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "cardlock";
pub const APP_NAME: &str = "vault";

fn project_dirs() -> anyhow::Result<ProjectDirs> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("cannot determine application directories"))
}

pub fn data_dir() -> anyhow::Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

pub fn config_dir() -> anyhow::Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

pub fn settings_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("settings.json"))
}

pub fn session_snapshot_path() -> anyhow::Result<PathBuf> {
    Ok(data_dir()?.join("session.json"))
}
