//! Synthetic placeholder records.
//!
//! Only used when the server is configured to show demo data after a failed
//! fetch; snapshots built from these are always marked `synthetic`.

use crate::analytics::normalize;
use crate::models::AnalyticsRecord;
use crate::tiktok::VideoDetails;
use chrono::{Duration, Utc};
use rand::Rng;

pub const DEMO_AUTHOR: &str = "demo";
const DEMO_VIDEO_COUNT: usize = 5;
const DEMO_COVER: &str = "https://via.placeholder.com/300x400/FF0050/FFFFFF?text=Demo";

const DEMO_TITLES: [&str; DEMO_VIDEO_COUNT] = [
    "Demo data: live metrics are unavailable",
    "Demo data: check the API scopes granted to this app",
    "Demo data: the display API only lists the authorized user's videos",
    "Demo data: values below are randomly generated",
    "Demo data: reauthorize to load real numbers",
];

pub fn demo_records() -> Vec<AnalyticsRecord> {
    let mut rng = rand::thread_rng();
    let now = Utc::now();

    DEMO_TITLES
        .iter()
        .enumerate()
        .map(|(i, title)| {
            let views: u64 = rng.gen_range(1_000..=50_000);
            let likes = rng.gen_range(50..=views / 10);
            let comments = rng.gen_range(5..=(likes * 3 / 10).max(5));
            let shares = rng.gen_range(1..=(likes / 10).max(1));
            let published = now - Duration::days(rng.gen_range(1..=30));

            let video = VideoDetails {
                id: format!("demo_video_{}", i + 1),
                title: (*title).to_string(),
                create_time: Some(published.timestamp().into()),
                cover_image_url: DEMO_COVER.to_string(),
                share_url: format!("https://www.tiktok.com/@demo/video/demo_{}", i + 1),
                duration: rng.gen_range(15..=60),
                view_count: views,
                like_count: likes,
                comment_count: comments,
                share_count: shares,
                ..VideoDetails::default()
            };

            AnalyticsRecord {
                author: DEMO_AUTHOR.to_string(),
                ..normalize(&video)
            }
        })
        .collect()
}
