use std::io::Write;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use mvpose::config::PipelineConfig;
use mvpose::Mode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in ["MVPOSE_DATA_DIR", "MVPOSE_MODE", "MVPOSE_VRS_BIN"] {
        std::env::remove_var(key);
    }
}

fn write_config(toml_src: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(toml_src.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
        mode = "bbox"
        data_dir = "/data"

        [inputs]
        input_capture_dir = "/captures/uni01/take01"
        from_frame_number = 5
        to_frame_number = 20
        ego_trajectory_path = "/trajectories/ego.csv"
        exo_trajectory_path = "/trajectories/exo.csv"

        [inputs.exo_timesync_name_to_calib_name]
        cam01 = "calib_cam_a"

        [mode_preprocess]
        vrs_bin_path = "/opt/vrs/bin/vrs"
        dataset_name = "dataset_v2"

        [mode_bbox]
        human_height = 1.8
        "#,
    );

    std::env::set_var("MVPOSE_MODE", "pose2d");
    std::env::set_var("MVPOSE_DATA_DIR", "/scratch/data");

    let cfg = PipelineConfig::load(file.path()).expect("load config");

    // Env layers over the file.
    assert_eq!(cfg.mode, Some(Mode::Pose2d));
    assert_eq!(cfg.data_dir.to_string_lossy(), "/scratch/data");

    assert_eq!(cfg.inputs.from_frame_number, 5);
    assert_eq!(cfg.inputs.to_frame_number, 20);
    assert_eq!(
        cfg.inputs
            .exo_timesync_name_to_calib_name
            .as_ref()
            .and_then(|m| m.get("cam01"))
            .map(String::as_str),
        Some("calib_cam_a")
    );
    assert_eq!(cfg.mode_preprocess.vrs_bin_path, "/opt/vrs/bin/vrs");
    assert_eq!(cfg.mode_preprocess.dataset_name, "dataset_v2");
    assert_eq!(cfg.mode_bbox.human_height, 1.8);
    // Untouched sections keep their defaults.
    assert_eq!(cfg.mode_bbox.detector_backend, "stub");
    assert_eq!(cfg.inputs.ego_streams, vec!["214-1", "1201-1", "1201-2"]);

    clear_env();
}

#[test]
fn unknown_mode_in_file_fails_fast() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
        mode = "segment"
        [inputs]
        input_capture_dir = "/captures/uni01/take01"
        "#,
    );
    let err = PipelineConfig::load(file.path()).expect_err("unknown mode");
    assert!(err.to_string().contains("unknown mode `segment`"));

    clear_env();
}

#[test]
fn config_without_any_capture_source_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
        mode = "preprocess"
        [inputs]
        to_frame_number = 10
        "#,
    );
    let err = PipelineConfig::load(file.path()).expect_err("no capture source");
    assert!(err.to_string().contains("metadata_json_path"));

    clear_env();
}
