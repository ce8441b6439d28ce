//! Trigger mode selection
//!
//! A function is invoked in exactly one way. The choice is made once, in
//! priority order:
//!
//! 1. schedule requested (and no explicit trigger): Pub/Sub topic plus a
//!    Cloud Scheduler job publishing to it
//! 2. explicit event trigger
//! 3. plain HTTPS

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::deployment::DeploymentSpec;
use crate::error::{PlanError, Result};
use crate::plan::resources::{
    EventTrigger, ResourceAddr, ResourceKind, SchedulerJobResource, TopicResource,
};
use crate::resolve::ResolvedContext;

/// Event type fired when a message is published to a topic
pub const PUBSUB_PUBLISH_EVENT: &str = "google.pubsub.topic.publish";

pub const DEFAULT_TIME_ZONE: &str = "Etc/UTC";

/// Message body published by the scheduler when none is configured
pub const DEFAULT_PAYLOAD: &str = "{}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TriggerMode {
    Http,
    Event {
        resource: String,
        event_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry: Option<RetryPolicy>,
    },
    Scheduled {
        cron: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry: Option<RetryPolicy>,
    },
}

impl TriggerMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Event { .. } => "event",
            Self::Scheduled { .. } => "scheduled",
        }
    }
}

/// Outcome of trigger selection: the mode plus whatever it needs in the plan
#[derive(Debug, Clone)]
pub struct TriggerSelection {
    pub mode: TriggerMode,
    /// Event trigger to attach to the function; `None` means HTTPS
    pub event_trigger: Option<EventTrigger>,
    pub topic: Option<TopicResource>,
    pub job: Option<SchedulerJobResource>,
}

/// Pick the trigger mode and synthesize its supporting resources
pub fn select(spec: &DeploymentSpec, ctx: &ResolvedContext) -> Result<TriggerSelection> {
    if ctx.scheduled_trigger_requested {
        // Flag is only set when a schedule exists
        let schedule = spec
            .schedule
            .as_ref()
            .ok_or_else(|| PlanError::conflict("schedule requested without a schedule"))?;
        validate_cron(&schedule.cron)?;

        let retry = schedule.retry_count.map(|retry_count| RetryPolicy { retry_count });
        let name = format!("{}-schedule", ctx.full_name);
        let topic = TopicResource {
            id: format!("projects/{}/topics/{}", ctx.project, name),
            name: name.clone(),
            project: ctx.project.clone(),
            labels: ctx.labels.clone(),
            depends_on: vec![],
        };
        let topic_addr = ResourceAddr::new(ResourceKind::PubsubTopic, topic.name.clone());

        let payload = schedule.payload.as_deref().unwrap_or(DEFAULT_PAYLOAD);
        let job = SchedulerJobResource {
            name,
            project: ctx.project.clone(),
            region: ctx.region.clone(),
            schedule: schedule.cron.clone(),
            time_zone: schedule
                .time_zone
                .clone()
                .unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string()),
            topic_name: topic.id.clone(),
            data: STANDARD.encode(payload),
            retry_config: retry,
            depends_on: vec![topic_addr],
        };

        let event_trigger = EventTrigger {
            event_type: PUBSUB_PUBLISH_EVENT.to_string(),
            resource: topic.id.clone(),
            failure_policy: retry,
        };

        debug!(topic = %topic.id, cron = %schedule.cron, "scheduled trigger selected");
        return Ok(TriggerSelection {
            mode: TriggerMode::Scheduled {
                cron: schedule.cron.clone(),
                retry,
            },
            event_trigger: Some(event_trigger),
            topic: Some(topic),
            job: Some(job),
        });
    }

    if let Some(trigger) = &spec.trigger {
        if spec.schedule.is_some() {
            warn!(
                function = %ctx.full_name,
                "both trigger and schedule set; using the explicit trigger and ignoring the schedule"
            );
        }
        if trigger.event_type.trim().is_empty() {
            return Err(PlanError::invalid("trigger.event_type", "must not be empty"));
        }
        if trigger.resource.trim().is_empty() {
            return Err(PlanError::invalid("trigger.resource", "must not be empty"));
        }

        // Only an explicitly supplied retry count produces a policy
        let retry = trigger.retry_count.map(|retry_count| RetryPolicy { retry_count });

        debug!(event_type = %trigger.event_type, "event trigger selected");
        return Ok(TriggerSelection {
            mode: TriggerMode::Event {
                resource: trigger.resource.clone(),
                event_type: trigger.event_type.clone(),
                retry,
            },
            event_trigger: Some(EventTrigger {
                event_type: trigger.event_type.clone(),
                resource: trigger.resource.clone(),
                failure_policy: retry,
            }),
            topic: None,
            job: None,
        });
    }

    debug!("http trigger selected");
    Ok(TriggerSelection {
        mode: TriggerMode::Http,
        event_trigger: None,
        topic: None,
        job: None,
    })
}

/// Unix cron: five whitespace-separated fields
fn validate_cron(cron: &str) -> Result<()> {
    let fields = cron.split_whitespace().count();
    if fields != 5 {
        return Err(PlanError::invalid(
            "schedule.cron",
            format!("expected 5 fields, found {}", fields),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::{Schedule, SourceRepository, TriggerConfig};
    use crate::resolve::resolve_context;

    fn base() -> DeploymentSpec {
        let mut spec = DeploymentSpec::new("demo-project-1", "ticker", "python311", "main");
        spec.source_repository = Some(SourceRepository {
            url: "https://source.developers.google.com/projects/demo-project-1/repos/ticker".into(),
        });
        spec
    }

    fn storage_trigger(retry_count: Option<u32>) -> TriggerConfig {
        TriggerConfig {
            event_type: "google.storage.object.finalize".into(),
            resource: "uploads-bucket".into(),
            retry_count,
        }
    }

    #[test]
    fn test_schedule_alone_is_scheduled() {
        let mut spec = base();
        spec.schedule = Some(Schedule::new("0 * * * *"));
        let ctx = resolve_context(&spec).unwrap();

        let selection = select(&spec, &ctx).unwrap();
        assert_eq!(
            selection.mode,
            TriggerMode::Scheduled {
                cron: "0 * * * *".into(),
                retry: None
            }
        );

        let topic = selection.topic.unwrap();
        assert_eq!(topic.id, "projects/demo-project-1/topics/ticker-schedule");

        let job = selection.job.unwrap();
        assert_eq!(job.topic_name, topic.id);
        assert_eq!(job.time_zone, DEFAULT_TIME_ZONE);
        assert_eq!(job.data, "e30=");
        assert!(job.retry_config.is_none());

        let trigger = selection.event_trigger.unwrap();
        assert_eq!(trigger.event_type, PUBSUB_PUBLISH_EVENT);
        assert_eq!(trigger.resource, topic.id);
        assert!(trigger.failure_policy.is_none());
    }

    #[test]
    fn test_explicit_trigger_wins_over_schedule() {
        let mut spec = base();
        spec.schedule = Some(Schedule::new("0 * * * *"));
        spec.trigger = Some(storage_trigger(None));
        let ctx = resolve_context(&spec).unwrap();
        assert!(!ctx.scheduled_trigger_requested);

        let selection = select(&spec, &ctx).unwrap();
        assert_eq!(selection.mode.label(), "event");
        assert!(selection.topic.is_none());
        assert!(selection.job.is_none());
    }

    #[test]
    fn test_neither_is_http() {
        let spec = base();
        let ctx = resolve_context(&spec).unwrap();
        let selection = select(&spec, &ctx).unwrap();
        assert_eq!(selection.mode, TriggerMode::Http);
        assert!(selection.event_trigger.is_none());
    }

    #[test]
    fn test_zero_retry_count_is_kept() {
        let mut spec = base();
        spec.trigger = Some(storage_trigger(Some(0)));
        let ctx = resolve_context(&spec).unwrap();

        let trigger = select(&spec, &ctx).unwrap().event_trigger.unwrap();
        assert_eq!(trigger.failure_policy, Some(RetryPolicy { retry_count: 0 }));
    }

    #[test]
    fn test_missing_retry_count_adds_no_policy() {
        let mut spec = base();
        spec.trigger = Some(storage_trigger(None));
        let ctx = resolve_context(&spec).unwrap();

        let trigger = select(&spec, &ctx).unwrap().event_trigger.unwrap();
        assert!(trigger.failure_policy.is_none());
    }

    #[test]
    fn test_scheduled_retry_reaches_job_and_trigger() {
        let mut spec = base();
        let mut schedule = Schedule::new("*/5 * * * *");
        schedule.retry_count = Some(3);
        schedule.payload = Some("tick".into());
        schedule.time_zone = Some("Europe/Paris".into());
        spec.schedule = Some(schedule);
        spec.region = Some("europe-west".into());
        let ctx = resolve_context(&spec).unwrap();

        let selection = select(&spec, &ctx).unwrap();
        let job = selection.job.unwrap();
        assert_eq!(job.region, "europe-west1");
        assert_eq!(job.retry_config, Some(RetryPolicy { retry_count: 3 }));
        assert_eq!(job.data, "dGljaw==");
        assert_eq!(job.time_zone, "Europe/Paris");
        assert_eq!(
            selection.event_trigger.unwrap().failure_policy,
            Some(RetryPolicy { retry_count: 3 })
        );
    }

    #[test]
    fn test_bad_cron_rejected() {
        let mut spec = base();
        spec.schedule = Some(Schedule::new("every hour"));
        let ctx = resolve_context(&spec).unwrap();
        let err = select(&spec, &ctx).unwrap_err();
        assert!(matches!(err, PlanError::ValidationFailed { ref field, .. } if field == "schedule.cron"));
    }
}
