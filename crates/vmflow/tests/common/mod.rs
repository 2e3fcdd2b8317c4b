#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Member string of the default blueprint's service account in project `demo`
pub const MEMBER: &str = "serviceAccount:web-sa@demo.iam.gserviceaccount.com";

pub const MINIMAL_CONFIG: &str = "project: demo\nzone: us-central1-a\n";

/// Stand-in for gcloud; `FAKE_GCLOUD_MODE=denied` makes the firewall rule
/// missing and its creation forbidden, everything else already exists.
const FAKE_GCLOUD: &str = r#"#!/bin/sh
MODE="${FAKE_GCLOUD_MODE:-provisioned}"
MEMBER="serviceAccount:web-sa@demo.iam.gserviceaccount.com"
case "$*" in
    --version*)
        echo "Google Cloud SDK 500.0.0"
        ;;
    *"get-iam-policy"*)
        echo "{\"bindings\": [
            {\"role\": \"roles/storage.objectViewer\", \"members\": [\"$MEMBER\"]},
            {\"role\": \"roles/logging.logWriter\", \"members\": [\"$MEMBER\"]},
            {\"role\": \"roles/pubsub.publisher\", \"members\": [\"$MEMBER\"]}
        ]}"
        ;;
    *"service-accounts describe"*)
        echo '{"email": "web-sa@demo.iam.gserviceaccount.com"}'
        ;;
    *"firewall-rules describe"*)
        if [ "$MODE" = "denied" ]; then
            echo "ERROR: (gcloud.compute.firewall-rules.describe) Could not fetch resource:" >&2
            echo " - The resource 'projects/demo/global/firewalls/web-allow-8080' was not found" >&2
            exit 1
        fi
        echo '{"name": "web-allow-8080"}'
        ;;
    *"firewall-rules create"*)
        echo "ERROR: (gcloud.compute.firewall-rules.create) Could not fetch resource:" >&2
        echo " - Required 'compute.firewalls.create' permission for 'projects/demo/global/firewalls/web-allow-8080'" >&2
        exit 1
        ;;
    *"addresses describe"*)
        echo '{"name": "web-ip", "address": "203.0.113.7", "status": "IN_USE"}'
        ;;
    *"instances describe"*)
        echo '{"name": "web-vm", "status": "RUNNING", "networkInterfaces": [{"accessConfigs": [{"name": "external-nat", "natIP": "203.0.113.7"}]}]}'
        ;;
    *)
        echo "ERROR: unexpected call: $*" >&2
        exit 1
        ;;
esac
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("home")).unwrap();
        fs::create_dir_all(root.path().join("xdg")).unwrap();
        Self { root }
    }

    pub fn write_config(&self, content: &str) {
        let path = self.root.path().join("vmflow.yaml");
        fs::write(path, content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn home(&self) -> PathBuf {
        self.root.path().join("home")
    }

    pub fn config_home(&self) -> PathBuf {
        self.root.path().join("xdg")
    }

    pub fn lock_dir(&self) -> PathBuf {
        let base = if cfg!(target_os = "macos") {
            self.home().join("Library").join("Application Support")
        } else {
            self.config_home()
        };
        base.join("vmflow").join("locks")
    }

    /// Install the fake gcloud and return a PATH that finds it first
    #[cfg(unix)]
    pub fn install_fake_gcloud(&self) -> String {
        use std::os::unix::fs::PermissionsExt;

        let bin = self.root.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        let gcloud = bin.join("gcloud");
        fs::write(&gcloud, FAKE_GCLOUD).unwrap();
        fs::set_permissions(&gcloud, fs::Permissions::from_mode(0o755)).unwrap();
        format!("{}:/usr/bin:/bin", bin.display())
    }

    /// `vmflow` isolated from the user's config, run inside the project
    #[allow(deprecated)]
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("vmflow").unwrap();
        cmd.current_dir(self.path())
            .env("HOME", self.home())
            .env("XDG_CONFIG_HOME", self.config_home())
            .env_remove("VMFLOW_CONFIG_PATH")
            .env_remove("VMFLOW_PROJECT")
            .env_remove("VMFLOW_ZONE")
            .env_remove("VMFLOW_REGION")
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG");
        cmd
    }
}
