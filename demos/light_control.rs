use std::sync::Arc;
use tracing::{error, info};
use taillight::{
    AppState, ClientConfig, ControlPage, FixedLoginCode, IndexPage, LightMode, LogNotifier,
    MemoryStore, Result, SimulatedCloud,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("🚲 Taillight Light Control Example");

    let state = Arc::new(AppState::new(
        Arc::new(SimulatedCloud::new()),
        Arc::new(FixedLoginCode::new("demo-login-code")),
        Arc::new(MemoryStore::new()),
        ClientConfig::default(),
    ));

    if !state.restore_session().await? {
        info!("🔑 Logging in...");
        if let Err(e) = state.login().await {
            error!("❌ Login failed: {}", e.user_message());
            return Err(e);
        }
    }
    info!("✅ Logged in");

    // Discover and bind a tail-light from the list page
    let notifier = Arc::new(LogNotifier);
    let mut index = IndexPage::new(state.clone(), notifier.clone());
    index.on_load().await;

    info!("🔍 Scanning for tail-lights...");
    let device_id = index.scan_and_bind().await;
    info!("📡 Found {}", device_id);

    if index.bind_device().await.is_none() {
        error!("❌ Binding failed");
        return Ok(());
    }
    index.select_device(&device_id).await;

    // Drive the light from the control page
    let mut control = ControlPage::new(state.clone(), notifier);
    control.on_show().await;

    let view = control.view().await;
    info!("📊 Initial Status:");
    info!("  Battery: {}%", view.status.battery);
    info!("  Mode: {}", view.selected_mode.display_name());
    info!("  Brightness: {}%", view.brightness);

    for mode in LightMode::ALL {
        info!("{} Switching to {}", mode.icon(), mode.display_name());
        control.select_mode(mode).await?;
    }

    info!("🔆 Dimming to 40%...");
    control.change_brightness(40).await?;

    info!("🛑 Flashing the brake light...");
    control.trigger_brake_light().await?;

    info!("🔒 Arming anti-theft...");
    control.toggle_anti_theft().await?;

    let ota = state.check_ota_update(&device_id).await?;
    info!(
        "⬆️ Firmware {} (latest {})",
        ota.str_field("currentVersion").unwrap_or("?"),
        ota.str_field("latestVersion").unwrap_or("?")
    );

    control.on_hide();

    let view = control.view().await;
    info!("📊 Final Status:");
    info!("  Mode: {}", view.selected_mode);
    info!("  Brightness: {}%", view.brightness);
    info!("  Anti-theft: {}", if view.anti_theft { "ON" } else { "OFF" });

    info!("🎉 Light control example completed!");
    Ok(())
}
