// ABOUTME: End-to-end tests of the local provider driven through a ticking bus
// ABOUTME: Each test works in its own temporary workspace

use parking_lot::Mutex;
use sourcebus_core::{
    BusConfig, ConnectionState, FileResponse, Notification, Response, SettingStatus,
    SourceControlBus, SourceControlFlags, SourceControlNotifications, SourceControlStatus,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio::runtime::Handle;

use crate::{LocalFileProvider, WORKSPACE_ROOT_KEY};

/// Tick the bus until `response` resolves
async fn drive<T>(bus: &SourceControlBus, mut response: Response<T>) -> T {
    let outcome = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            tokio::select! {
                result = &mut response => return result,
                _ = bus.tick_when_ready() => {}
            }
        }
    })
    .await;
    outcome
        .expect("response did not arrive in time")
        .expect("bus dropped the response")
}

fn active_workspace() -> (TempDir, SourceControlBus, Arc<LocalFileProvider>) {
    let dir = tempdir().unwrap();
    let bus = SourceControlBus::new(BusConfig::default());
    let provider = LocalFileProvider::install(&bus, Handle::current(), dir.path()).unwrap();
    assert!(bus.connection().is_active());
    (dir, bus, provider)
}

fn write_file(dir: &TempDir, name: &str, readonly: bool) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, name).unwrap();
    if readonly {
        let mut permissions = std::fs::metadata(&path).unwrap().permissions();
        permissions.set_readonly(true);
        std::fs::set_permissions(&path, permissions).unwrap();
    }
    path
}

async fn file_info(bus: &SourceControlBus, path: &Path) -> FileResponse {
    drive(bus, bus.commands().file_info(path)).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_get_file_info_reflects_filesystem() {
    let (dir, bus, _provider) = active_workspace();
    let writable = write_file(&dir, "open.rs", false);
    let locked = write_file(&dir, "locked.rs", true);

    let result = file_info(&bus, &writable).await;
    assert!(result.success);
    assert_eq!(result.info.status, SourceControlStatus::Tracked);
    assert!(result.info.has_flag(SourceControlFlags::WRITEABLE));

    let result = file_info(&bus, &locked).await;
    assert!(result.success);
    assert_eq!(result.info.status, SourceControlStatus::Tracked);
    assert!(result.info.is_read_only());

    let result = file_info(&bus, &dir.path().join("missing.rs")).await;
    assert!(result.success);
    assert_eq!(result.info.status, SourceControlStatus::NotTracked);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_edit_checks_out_read_only_file() {
    let (dir, bus, _provider) = active_workspace();
    let locked = write_file(&dir, "locked.rs", true);

    let result = drive(&bus, bus.commands().edit(&locked, false)).await;
    assert!(result.success);
    assert_eq!(result.info.status, SourceControlStatus::OpenByUser);
    assert_eq!(result.info.flags, SourceControlFlags::WRITEABLE);
    assert_eq!(result.info.path, locked);

    let result = file_info(&bus, &locked).await;
    assert!(!result.info.is_read_only());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_edit_of_new_file_is_allowed() {
    let (dir, bus, _provider) = active_workspace();
    let new_file = dir.path().join("new.rs");

    let result = drive(&bus, bus.commands().edit(&new_file, true)).await;
    assert!(result.success);
    assert_eq!(result.info.status, SourceControlStatus::NotTracked);
    assert!(result.info.has_flag(SourceControlFlags::WRITEABLE));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_delete_removes_file() {
    let (dir, bus, _provider) = active_workspace();
    let doomed = write_file(&dir, "doomed.rs", false);

    let result = drive(&bus, bus.commands().delete(&doomed)).await;
    assert!(result.success);
    assert_eq!(result.info.status, SourceControlStatus::NotTracked);
    assert!(!doomed.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_revert_answers_current_status() {
    let (dir, bus, _provider) = active_workspace();
    let file = write_file(&dir, "kept.rs", false);

    let result = drive(&bus, bus.commands().revert(&file)).await;
    assert!(result.success);
    assert_eq!(result.info.status, SourceControlStatus::Tracked);
    assert!(file.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_paths_outside_workspace_are_not_tracked() {
    let (_dir, bus, _provider) = active_workspace();
    let elsewhere = tempdir().unwrap();
    let foreign = write_file(&elsewhere, "foreign.rs", false);

    let result = file_info(&bus, &foreign).await;
    assert!(result.success);
    assert_eq!(result.info.status, SourceControlStatus::NotTracked);
    assert_eq!(result.info.path, foreign);

    let result = drive(&bus, bus.commands().delete(&foreign)).await;
    assert!(result.success);
    assert_eq!(result.info.status, SourceControlStatus::NotTracked);
    assert!(foreign.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_operations_on_same_path_run_in_issue_order() {
    let (dir, bus, _provider) = active_workspace();
    let file = write_file(&dir, "shared.rs", true);

    let edit = bus.commands().edit(&file, false);
    let delete = bus.commands().delete(&file);
    let info = bus.commands().file_info(&file);

    assert_eq!(
        drive(&bus, edit).await.info.status,
        SourceControlStatus::OpenByUser
    );
    assert!(drive(&bus, delete).await.success);
    assert_eq!(
        drive(&bus, info).await.info.status,
        SourceControlStatus::NotTracked
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disabled_provider_answers_provider_down() {
    let (dir, bus, _provider) = active_workspace();
    let file = write_file(&dir, "idle.rs", false);

    bus.connection().enable_source_control(false);
    assert_eq!(
        bus.connection().source_control_state(),
        ConnectionState::Disabled
    );

    let result = file_info(&bus, &file).await;
    assert!(!result.success);
    assert_eq!(result.info.status, SourceControlStatus::ProviderDown);
}

#[derive(Default)]
struct StateLog(Mutex<Vec<ConnectionState>>);

impl SourceControlNotifications for StateLog {
    fn connectivity_state_changed(&self, state: ConnectionState) {
        self.0.lock().push(state);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_root_is_invalid_until_setting_fixes_it() {
    let dir = tempdir().unwrap();
    let bus = SourceControlBus::new(BusConfig::default());
    let states = Arc::new(StateLog::default());
    bus.register_listener(states.clone());

    let provider = LocalFileProvider::install(
        &bus,
        Handle::current(),
        dir.path().join("does-not-exist"),
    )
    .unwrap();
    assert_eq!(
        bus.connection().source_control_state(),
        ConnectionState::ConfigurationInvalid
    );
    assert!(!bus.connection().is_active());
    assert!(!bus.connection().has_trust_issue());

    let root = dir.path().display().to_string();
    let info = drive(&bus, bus.connection().set_setting(WORKSPACE_ROOT_KEY, &root)).await;
    assert_eq!(info.status, SettingStatus::Set);
    assert_eq!(info.value, root);
    assert!(bus.connection().is_active());
    assert_eq!(provider.workspace_root(), Some(dir.path().to_path_buf()));

    bus.tick();
    assert_eq!(
        *states.0.lock(),
        vec![
            ConnectionState::Disabled,
            ConnectionState::ConfigurationInvalid,
            ConnectionState::Active
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connection_settings() {
    let (dir, bus, provider) = active_workspace();

    let info = drive(&bus, bus.connection().setting(WORKSPACE_ROOT_KEY)).await;
    assert_eq!(info.status, SettingStatus::Set);
    assert!(info.is_available());
    assert_eq!(info.value, dir.path().display().to_string());

    let info = drive(&bus, bus.connection().setting("server_port")).await;
    assert_eq!(info.status, SettingStatus::Invalid);

    let info = drive(&bus, bus.connection().set_setting(WORKSPACE_ROOT_KEY, "")).await;
    assert_eq!(info.status, SettingStatus::Unset);
    assert!(info.is_settable());
    assert_eq!(provider.workspace_root(), None);
    assert_eq!(
        bus.connection().source_control_state(),
        ConnectionState::ConfigurationInvalid
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_trust_prompt_is_never_raised() {
    let (_dir, bus, _provider) = active_workspace();
    let seen = Arc::new(Mutex::new(Vec::<Notification>::new()));

    struct TrustSpy(Arc<Mutex<Vec<Notification>>>);
    impl SourceControlNotifications for TrustSpy {
        fn request_trust(&self, fingerprint: &str) {
            self.0.lock().push(Notification::request_trust(fingerprint));
        }
    }
    bus.register_listener(Arc::new(TrustSpy(seen.clone())));

    bus.connection().enable_trust(true, "AB:CD");
    bus.tick();
    assert!(!bus.connection().has_trust_issue());
    assert!(seen.lock().is_empty());
}
