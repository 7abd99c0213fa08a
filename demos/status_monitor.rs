use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{info, warn};
use taillight::{
    AppState, ClientConfig, ControlPage, DeviceStatus, FixedLoginCode, LogNotifier, MemoryStore,
    Result, SimulatedCloud,
};

const DEVICE_ID: &str = "bike_light_demo01";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("📊 Taillight Status Monitor Example");

    let cloud = Arc::new(SimulatedCloud::new());
    cloud.seed_device(DEVICE_ID, "通勤车").await;

    let config = ClientConfig {
        poll_interval_ms: 1_000,
        ..ClientConfig::default()
    };
    let state = Arc::new(AppState::new(
        cloud.clone(),
        Arc::new(FixedLoginCode::new("demo-login-code")),
        Arc::new(MemoryStore::new()),
        config,
    ));
    state.login().await?;
    state.list_devices().await.into_result()?;
    state.select_device(DEVICE_ID).await?;

    let mut page = ControlPage::new(state.clone(), Arc::new(LogNotifier));
    page.on_show().await;
    info!("🔍 Polling every second while the page is shown");

    // Drain the simulated battery while the page polls
    for step in 0..6_u8 {
        let battery = 100 - step * 15;
        cloud
            .set_status(
                DEVICE_ID,
                DeviceStatus {
                    battery,
                    temperature: 25.0 + f32::from(step) * 3.5,
                    online: true,
                    ..DeviceStatus::default()
                },
            )
            .await;

        sleep(Duration::from_millis(1_100)).await;

        let status = page.view().await.status;
        println!("\n📊 Status Update ({step})");
        println!("┌─────────────────────────────────┐");
        println!("│ Battery:     {:>4}%              │", status.battery);
        println!("│ Temperature: {:>6.1}°C           │", status.temperature);
        println!("│ Mode:        {:<10}         │", status.mode.display_name());
        println!("│ Online:      {:<5}              │", status.online);
        println!("└─────────────────────────────────┘");

        if status.battery < 30 {
            warn!("🪫 Battery low: {}%", status.battery);
        }
        if status.temperature > 40.0 {
            warn!("🌡️ High temperature: {:.1}°C", status.temperature);
        }
    }

    page.on_hide();
    info!("🛑 Page hidden, polling stopped: {}", !page.is_polling());

    info!("🎉 Status monitoring completed!");
    Ok(())
}
