//! Server automation settings.

use crate::api::{DashboardApi, Settings, SettingsUpdate};
use crate::error::AppError;
use crate::ui;

/// Show the settings, or apply `update` first when it sets anything.
pub async fn settings_report(api: &impl DashboardApi, update: SettingsUpdate) -> Result<String, AppError> {
    let settings = if update.auto_block.is_none() && update.threshold.is_none() {
        api.fetch_settings().await?
    } else {
        let settings = api.update_settings(update).await?;
        tracing::info!("Settings saved");
        settings
    };
    Ok(format_settings(&settings))
}

pub fn format_settings(settings: &Settings) -> String {
    format!(
        "auto-block: {}\nthreshold:  {}",
        if settings.auto_block { "enabled" } else { "disabled" },
        ui::format_risk(settings.threshold)
    )
}
