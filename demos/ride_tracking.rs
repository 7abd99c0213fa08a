use std::sync::Arc;
use tracing::{error, info};
use taillight::{
    util::{format_distance, format_duration},
    AppState, ClientConfig, FixedLoginCode, MemoryStore, Result, SimulatedCloud, TaillightError,
    TrackPoint,
};

const DEVICE_ID: &str = "bike_light_demo02";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("🗺️ Taillight Ride Tracking Example");

    let cloud = Arc::new(SimulatedCloud::new());
    cloud.seed_device(DEVICE_ID, "山地车").await;

    let state = AppState::new(
        cloud,
        Arc::new(FixedLoginCode::new("demo-login-code")),
        Arc::new(MemoryStore::new()),
        ClientConfig::default(),
    );
    state.login().await?;

    // Stopping before starting is refused locally
    match state.stop_tracking().await {
        Err(TaillightError::NoActiveTrack) => info!("ℹ️ No ride in progress yet"),
        Err(e) => return Err(e),
        Ok(_) => error!("❌ Unexpected track summary"),
    }

    let track_id = state.start_tracking(DEVICE_ID).await?;
    info!("▶️ Ride started: {}", track_id);

    // A short ride north along a meridian, one fix every 30 seconds
    let start = chrono::Utc::now();
    for i in 0..10_i32 {
        let point = TrackPoint {
            lat: 31.2304 + f64::from(i) * 0.001,
            lon: 121.4737,
            timestamp: start + chrono::Duration::seconds(i64::from(i) * 30),
        };
        state.add_track_point(&track_id, point).await?;
    }

    let summary = state.stop_tracking().await?;
    info!("⏹️ Ride finished: {}", summary.track_id);
    info!(
        "  Distance: {}",
        format_distance(summary.distance_m().unwrap_or_default())
    );
    info!(
        "  Duration: {}",
        format_duration(summary.duration_s().unwrap_or_default() as u64)
    );

    let group = state.create_group("周末骑行", "2468").await?;
    info!(
        "👥 Created riding group {}",
        group.str_field("groupId").unwrap_or("?")
    );

    info!("🎉 Ride tracking example completed!");
    Ok(())
}
