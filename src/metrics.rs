use std::sync::LazyLock;

use prometheus::*;

static METRIC_ENHANCE_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "imsense_enhance_count",
        "count of the analysis results enhanced",
        &["scene_type"]
    )
    .expect("failed to register imsense_enhance_count")
});

static METRIC_ENHANCE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "imsense_enhance_duration",
        "duration of the per-request enhancement in seconds",
        exponential_buckets(0.0001, 4.0, 8).expect("invalid buckets")
    )
    .expect("failed to register imsense_enhance_duration")
});

static METRIC_FACE_LOOKUP: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "imsense_face_lookup_count",
        "count of the face cluster lookups",
        &["matched"]
    )
    .expect("failed to register imsense_face_lookup_count")
});

/// 增加增强请求计数
pub fn inc_enhance_count(scene_type: &str) {
    METRIC_ENHANCE_COUNT.with_label_values(&[scene_type]).inc();
}

pub fn observe_enhance_duration(duration: f32) {
    METRIC_ENHANCE_DURATION.observe(duration as f64);
}

pub fn inc_face_lookup(matched: bool) {
    let matched = if matched { "true" } else { "false" };
    METRIC_FACE_LOOKUP.with_label_values(&[matched]).inc();
}

/// 以文本格式导出所有指标
pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    Ok(encoder.encode_to_string(&prometheus::gather())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_contains_counters() {
        inc_enhance_count("group");
        inc_face_lookup(true);
        observe_enhance_duration(0.001);
        let text = gather_text().unwrap();
        assert!(text.contains("imsense_enhance_count"));
        assert!(text.contains("imsense_face_lookup_count"));
        assert!(text.contains("imsense_enhance_duration"));
    }
}
