use crate::core::engine::SessionHandle;
use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone};
use std::time::Duration;

/// Time left until the next midnight in `now`'s time zone.
pub fn until_next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let tz = now.timezone();
    let tomorrow = now.date_naive() + ChronoDuration::days(1);
    let Some(midnight) = tomorrow.and_hms_opt(0, 0, 0) else {
        return Duration::from_secs(24 * 3600);
    };

    // DST 轉換日可能沒有 00:00，取最早的合法時間
    let next = tz
        .from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| now.clone() + ChronoDuration::hours(24));

    (next - now.clone()).to_std().unwrap_or(Duration::from_secs(1))
}

/// Sleeps until local midnight, then asks the engine to reset the counter. Runs until the engine stops.
pub fn spawn_daily_reset(handle: SessionHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wait = until_next_midnight(&Local::now());
            tracing::debug!("Next daily reset in {}s", wait.as_secs());
            tokio::time::sleep(wait).await;

            if let Err(e) = handle.reset_daily_counter().await {
                tracing::warn!("⚠️ Daily reset scheduler stopping: {}", e);
                break;
            }
        }
    })
}
