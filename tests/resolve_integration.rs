//! End-to-end resolution tests
//!
//! These tests load deployment files from disk, package real source trees
//! and check the resulting plans.

use cloudfn_plan::plan::resources::{FunctionSource, ResourceKind};
use cloudfn_plan::{resolve, DeploymentSpec, PlanError, TriggerMode, ZipPackager};
use std::collections::BTreeSet;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Source tree plus a deployment file pointing at it
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(deployment_body: &str) -> Self {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/index.js", "exports.handler = (req, res) => res.send('ok');\n");
        write(dir.path(), "src/package.json", "{\"name\":\"hello\"}\n");
        write(dir.path(), "src/node_modules/dep/index.js", "module.exports = 1;\n");

        let yaml = format!(
            "project: demo-project-1\nname: hello\nruntime: nodejs20\nentry_point: handler\n\
             bundle:\n  source_dir: {src}\n  excludes: [node_modules]\n  output_path: {out}\n{body}",
            src = dir.path().join("src").display(),
            out = dir.path().join("out/bundle.zip").display(),
            body = deployment_body,
        );
        write(dir.path(), "deploy.yaml", &yaml);

        Self { dir }
    }

    fn spec(&self) -> DeploymentSpec {
        DeploymentSpec::from_file(self.dir.path().join("deploy.yaml")).unwrap()
    }
}

/// Trigger priority, exercised through file input
mod trigger_priority {
    use super::*;

    #[test]
    fn test_schedule_only_is_scheduled() {
        let fixture = Fixture::new("bucket: {}\nschedule:\n  cron: \"0 * * * *\"\n");
        let plan = resolve(&fixture.spec(), &ZipPackager).unwrap();

        assert!(matches!(plan.trigger_mode, TriggerMode::Scheduled { ref cron, .. } if cron == "0 * * * *"));
        assert!(plan.topic.is_some());
        assert!(plan.scheduler_job.is_some());
        assert!(!plan.function.trigger_http);
    }

    #[test]
    fn test_trigger_and_schedule_prefers_trigger() {
        let fixture = Fixture::new(
            "bucket: {}\nschedule:\n  cron: \"0 * * * *\"\ntrigger:\n  event_type: google.storage.object.finalize\n  resource: uploads\n",
        );
        let plan = resolve(&fixture.spec(), &ZipPackager).unwrap();

        assert_eq!(plan.trigger_mode.label(), "event");
        assert!(plan.topic.is_none());
        assert!(plan.scheduler_job.is_none());
        let trigger = plan.function.event_trigger.unwrap();
        assert_eq!(trigger.event_type, "google.storage.object.finalize");
        assert!(trigger.failure_policy.is_none());
    }

    #[test]
    fn test_neither_is_http() {
        let fixture = Fixture::new("bucket: {}\n");
        let plan = resolve(&fixture.spec(), &ZipPackager).unwrap();
        assert_eq!(plan.trigger_mode, TriggerMode::Http);
        assert!(plan.function.trigger_http);
        assert!(plan.function.event_trigger.is_none());
    }
}

mod configuration_errors {
    use super::*;

    #[test]
    fn test_bundle_with_repository_conflicts() {
        let fixture = Fixture::new(
            "bucket: {}\nsource_repository:\n  url: https://source.developers.google.com/projects/demo-project-1/repos/hello\n",
        );
        let err = resolve(&fixture.spec(), &ZipPackager).unwrap_err();
        assert!(matches!(err, PlanError::ConfigurationConflict(_)));
    }

    #[test]
    fn test_no_bucket_conflicts() {
        let fixture = Fixture::new("");
        let err = resolve(&fixture.spec(), &ZipPackager).unwrap_err();
        assert!(matches!(err, PlanError::ConfigurationConflict(_)));
        // Nothing was packaged
        assert!(!fixture.dir.path().join("out/bundle.zip").exists());
    }

    #[test]
    fn test_duplicate_role_in_json_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deploy.json");
        std::fs::write(
            &path,
            r#"{
                "project": "demo-project-1",
                "name": "hello",
                "runtime": "nodejs20",
                "entry_point": "handler",
                "source_repository": {"url": "https://source.developers.google.com/projects/demo-project-1/repos/hello"},
                "iam_bindings": {
                    "roles/cloudfunctions.invoker": ["allUsers"],
                    "roles/cloudfunctions.invoker": ["user:ops@example.com"]
                }
            }"#,
        )
        .unwrap();

        let spec = DeploymentSpec::from_file(&path).unwrap();
        let err = resolve(&spec, &ZipPackager).unwrap_err();
        assert!(matches!(err, PlanError::DuplicateKey { .. }));
    }
}

#[test]
fn test_iam_bindings_exact_role_member_sets() {
    let fixture = Fixture::new(
        "bucket: {}\niam_bindings:\n  roles/viewer: [userA]\n  roles/invoker: [userB, userC]\n",
    );
    let plan = resolve(&fixture.spec(), &ZipPackager).unwrap();

    assert_eq!(plan.iam_bindings.len(), 2);
    let as_pairs: BTreeSet<(String, Vec<String>)> = plan
        .iam_bindings
        .iter()
        .map(|b| (b.role.clone(), b.members.iter().cloned().collect()))
        .collect();
    let expected: BTreeSet<(String, Vec<String>)> = [
        ("roles/viewer".to_string(), vec!["userA".to_string()]),
        (
            "roles/invoker".to_string(),
            vec!["userB".to_string(), "userC".to_string()],
        ),
    ]
    .into_iter()
    .collect();
    assert_eq!(as_pairs, expected);
}

#[test]
fn test_resolving_twice_is_byte_identical() {
    let fixture = Fixture::new(
        "bucket: {}\nregion: europe-west\nservice_account:\n  create: true\nschedule:\n  cron: \"*/10 * * * *\"\n  retry_count: 2\nlabels:\n  team: growth\nenvironment_variables:\n  TOKEN: s3cret\n",
    );
    let spec = fixture.spec();

    let first = serde_json::to_vec(&resolve(&spec, &ZipPackager).unwrap()).unwrap();
    let second = serde_json::to_vec(&resolve(&spec, &ZipPackager).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_bundle_object_named_from_archive_content() {
    let fixture = Fixture::new("bucket: {}\n");
    let plan = resolve(&fixture.spec(), &ZipPackager).unwrap();

    let object = plan.bundle_object.as_ref().unwrap();
    assert_eq!(object.name, format!("bundle-{}.zip", object.md5));
    assert_eq!(
        plan.function.source,
        FunctionSource::Bucket {
            bucket: "demo-project-1-hello-source".into(),
            object: object.name.clone()
        }
    );

    // Touching an excluded file keeps the name
    write(fixture.dir.path(), "src/node_modules/dep/index.js", "module.exports = 2;\n");
    let again = resolve(&fixture.spec(), &ZipPackager).unwrap();
    assert_eq!(again.bundle_object.unwrap().name, object.name);

    // Changing real source changes it
    write(fixture.dir.path(), "src/index.js", "exports.handler = (req, res) => res.send('ok!');\n");
    let changed = resolve(&fixture.spec(), &ZipPackager).unwrap();
    assert_ne!(changed.bundle_object.unwrap().name, object.name);
}

#[test]
fn test_region_alias_flows_into_regional_resources() {
    let fixture = Fixture::new(
        "bucket: {}\nregion: europe-west\nvpc_connector:\n  create: true\n  network: default\n  ip_cidr_range: 10.8.0.0/28\nschedule:\n  cron: \"0 0 * * *\"\n",
    );
    let plan = resolve(&fixture.spec(), &ZipPackager).unwrap();

    assert_eq!(plan.function.region, "europe-west1");
    assert_eq!(plan.scheduler_job.as_ref().unwrap().region, "europe-west1");
    assert_eq!(plan.bucket.as_ref().unwrap().location, "europe-west1");
    let connector = plan.vpc_connector.as_ref().unwrap();
    assert_eq!(
        connector.id,
        "projects/demo-project-1/locations/europe-west1/connectors/hello-vpc"
    );

    let kinds: Vec<ResourceKind> = plan.descriptors().iter().map(|d| d.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            ResourceKind::StorageBucket,
            ResourceKind::StorageObject,
            ResourceKind::VpcConnector,
            ResourceKind::PubsubTopic,
            ResourceKind::SchedulerJob,
            ResourceKind::CloudFunction,
        ]
    );
}

#[test]
fn test_environment_variables_redacted_in_debug_only() {
    let fixture = Fixture::new("bucket: {}\nenvironment_variables:\n  DB_PASSWORD: pa55word\n");
    let plan = resolve(&fixture.spec(), &ZipPackager).unwrap();

    assert!(!format!("{:?}", plan).contains("pa55word"));
    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(json["function"]["environment_variables"]["DB_PASSWORD"], "pa55word");
}
