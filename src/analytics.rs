//! Normalization of raw video objects into [`AnalyticsRecord`]s.
//!
//! The display API exposes no watch-time or retention telemetry, so
//! `avg_watch_time`, `completion_rate`, `bounce_rate` and `new_followers` are
//! heuristic estimates derived from engagement and duration.

use crate::models::AnalyticsRecord;
use crate::tiktok::VideoDetails;
use chrono::DateTime;
use serde_json::Value;

const BOUNCE_RATE_FALLBACK: f64 = 5.0;
const COMPLETION_RATE_CAP: f64 = 95.0;
const FOLLOWER_CONVERSION: f64 = 0.02;
pub const CURRENT_USER: &str = "current_user";

pub fn normalize(video: &VideoDetails) -> AnalyticsRecord {
    let views = video.view_count;
    let likes = video.like_count;
    let comments = video.comment_count;
    let shares = video.share_count;
    let duration = video.duration;

    let engagement = engagement_rate(views, likes, comments, shares);
    let (avg_watch_time, completion_rate) = if duration > 0 && views > 0 {
        (
            estimate_watch_time(duration, engagement),
            estimate_completion_rate(duration, engagement),
        )
    } else {
        (0.0, 0.0)
    };

    let description = if video.video_description.is_empty() {
        video.title.clone()
    } else {
        video.video_description.clone()
    };

    AnalyticsRecord {
        video_id: video.id.clone(),
        title: video.title.clone(),
        description,
        author: CURRENT_USER.to_string(),
        publish_time: video.create_time.as_ref().and_then(publish_time),
        views,
        likes,
        comments,
        shares,
        duration,
        engagement_rate: round_to(engagement, 2),
        avg_watch_time: round_to(avg_watch_time, 1),
        completion_rate: round_to(completion_rate, 1),
        bounce_rate: round_to(estimate_bounce_rate(engagement), 2),
        share_url: video.share_url.clone(),
        cover_image: video.cover_image_url.clone(),
        embed_link: video.embed_link.clone(),
        video_height: video.height,
        video_width: video.width,
        new_followers: (likes as f64 * FOLLOWER_CONVERSION) as u64,
    }
}

/// `(likes + comments + shares) / views * 100`, or 0 without views.
pub fn engagement_rate(views: u64, likes: u64, comments: u64, shares: u64) -> f64 {
    if views == 0 {
        return 0.0;
    }
    let interactions = likes.saturating_add(comments).saturating_add(shares);
    interactions as f64 * 100.0 / views as f64
}

pub fn estimate_watch_time(duration: u64, engagement_rate: f64) -> f64 {
    let watch_ratio = (0.2 + engagement_rate / 100.0 * 0.6).clamp(0.0, 1.0);
    duration as f64 * watch_ratio
}

/// Short videos start from a higher completion baseline.
pub fn estimate_completion_rate(duration: u64, engagement_rate: f64) -> f64 {
    let base = match duration {
        0..=15 => 60.0,
        16..=30 => 40.0,
        _ => 25.0,
    };
    (base + engagement_rate * 2.0).min(COMPLETION_RATE_CAP)
}

pub fn estimate_bounce_rate(engagement_rate: f64) -> f64 {
    if engagement_rate > 0.0 {
        (10.0 - engagement_rate / 5.0).max(1.0)
    } else {
        BOUNCE_RATE_FALLBACK
    }
}

fn publish_time(raw: &Value) -> Option<String> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.to_rfc3339()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
