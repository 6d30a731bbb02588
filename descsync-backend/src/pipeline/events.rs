use serde::{Deserialize, Serialize};

/// Data-only job events exchanged with the queue.
/// Serialized as `{"event": "videos.update", "data": {"videoIds": [..]}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum JobEvent {
    #[serde(rename = "channel.sync")]
    ChannelSync { channel_id: i64 },

    #[serde(rename = "videos.update")]
    VideosUpdate { video_ids: Vec<i64> },

    #[serde(rename = "container.updated")]
    ContainerUpdated { container_id: i64 },

    #[serde(rename = "template.updated")]
    TemplateUpdated { template_id: i64 },
}

impl JobEvent {
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::ChannelSync { .. } => "channel.sync",
            JobEvent::VideosUpdate { .. } => "videos.update",
            JobEvent::ContainerUpdated { .. } => "container.updated",
            JobEvent::TemplateUpdated { .. } => "template.updated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let event = JobEvent::VideosUpdate {
            video_ids: vec![3, 1],
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "videos.update", "data": {"videoIds": [3, 1]}})
        );

        let parsed: JobEvent =
            serde_json::from_value(json!({"event": "channel.sync", "data": {"channelId": 7}}))
                .unwrap();
        assert_eq!(parsed, JobEvent::ChannelSync { channel_id: 7 });
        assert_eq!(parsed.name(), "channel.sync");
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let parsed: Result<JobEvent, _> =
            serde_json::from_value(json!({"event": "channel.delete", "data": {"channelId": 7}}));
        assert!(parsed.is_err());
    }
}
