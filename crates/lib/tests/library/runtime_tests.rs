//! Runtime context behavior through the public API.

use std::panic::AssertUnwindSafe;
use std::rc::Rc;

use hpcrt_lib::runtime::{TempRuntime, init_runtime, runtime, switch_runtime, with_runtime};
use hpcrt_lib::{ConfigError, RuntimeContext, RuntimeError};
use serde_json::Value;
use tempfile::TempDir;

use super::common::{site_config, write_site_config};

mod paths {
  use super::*;

  #[test]
  fn retries_only_rename_the_leaf() {
    let temp = TempDir::new().unwrap();
    let _rt = TempRuntime::new(Some(site_config(temp.path(), "testsys"))).unwrap();
    let rt = runtime().unwrap();

    let first = rt.make_stagedir(&["testsys", "login", "gnu", "hello"], true).unwrap();
    assert_eq!(first, temp.path().join("stage/ts/testsys/login/gnu/hello"));

    rt.next_run();
    let retry = rt.make_stagedir(&["testsys", "login", "gnu", "hello"], true).unwrap();
    assert_eq!(retry, temp.path().join("stage/ts/testsys/login/gnu/hello_retry1"));

    // Both runs share their parent directory
    assert_eq!(first.parent(), retry.parent());
    assert!(first.is_dir());
    assert!(retry.is_dir());
  }

  #[test]
  fn output_and_perflog_prefixes() {
    let temp = TempDir::new().unwrap();
    let _rt = TempRuntime::new(Some(site_config(temp.path(), "testsys"))).unwrap();
    let rt = runtime().unwrap();

    let out = rt.make_outputdir(&["testsys", "hello"], true).unwrap();
    assert_eq!(out, temp.path().join("output/ts/testsys/hello"));
    assert_eq!(rt.perflog_prefix().unwrap(), temp.path().join("perflogs"));
  }

  #[cfg(unix)]
  #[test]
  fn unwritable_prefix_is_an_io_error() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let locked = temp.path().join("locked");
    std::fs::create_dir(&locked).unwrap();
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o500)).unwrap();

    let mut config = site_config(temp.path(), "testsys");
    config.add_sticky_option("systems/stagedir", locked.join("stage").to_string_lossy().into_owned());
    let rt = RuntimeContext::new(config).unwrap();

    let result = rt.make_stagedir(&["x"], true);
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o700)).unwrap();

    // Root ignores permission bits
    if let Err(err) = result {
      assert!(matches!(err, RuntimeError::Io { .. }));
      assert!(err.to_string().contains("could not create directory"));
    }
  }
}

mod context_switch {
  use super::*;

  #[test]
  fn init_runtime_keeps_first_context() {
    let temp = TempDir::new().unwrap();
    let _reset = TempRuntime::new(None).unwrap();

    let first = init_runtime(site_config(temp.path(), "testsys")).unwrap();
    first.next_run();
    let second = init_runtime(site_config(temp.path(), "lmodsys")).unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(runtime().unwrap().current_run(), 1);
  }

  #[test]
  fn temp_runtime_from_file() {
    let temp = TempDir::new().unwrap();
    let path = write_site_config(temp.path(), temp.path());

    let _reset = TempRuntime::new(None).unwrap();
    {
      let options = [("general/timestamp", Value::from("%Y"))];
      let guard = TempRuntime::from_file(Some(&path), Some("testsys:compute"), &options).unwrap();
      let rt = guard.runtime().unwrap();

      assert_eq!(rt.system().name(), "testsys");
      assert_eq!(rt.system().partitions().len(), 1);
      assert_eq!(rt.system().partitions()[0].fullname, "testsys:compute");
      assert_eq!(rt.timestamp().unwrap().len(), 4);
      assert_eq!(rt.site_config().source(), Some(path.as_path()));
    }
    assert!(matches!(runtime(), Err(RuntimeError::NotConfigured)));
  }

  #[test]
  fn unknown_system_in_file_is_a_config_error() {
    let temp = TempDir::new().unwrap();
    let path = write_site_config(temp.path(), temp.path());

    let err = TempRuntime::from_file(Some(&path), Some("nosuchsys"), &[]).unwrap_err();
    assert!(matches!(err, RuntimeError::Config(ConfigError::SystemNotFound(_))));
    assert!(!err.is_fatal());
  }

  #[test]
  fn wrapped_function_sees_its_own_runtime() {
    let outer_dir = TempDir::new().unwrap();
    let inner_dir = TempDir::new().unwrap();
    let _outer = TempRuntime::new(Some(site_config(outer_dir.path(), "testsys"))).unwrap();

    let prefix_of = switch_runtime(Some(site_config(inner_dir.path(), "testsys")), |_: ()| {
      runtime()?.prefix()
    });

    assert_eq!(prefix_of(()).unwrap(), inner_dir.path());
    assert_eq!(runtime().unwrap().prefix().unwrap(), outer_dir.path());
  }

  #[test]
  fn errors_inside_with_runtime_propagate_after_restore() {
    let temp = TempDir::new().unwrap();
    let _reset = TempRuntime::new(None).unwrap();

    let result: Result<(), RuntimeError> = with_runtime(Some(site_config(temp.path(), "testsys")), || {
      assert!(runtime().is_ok());
      Err(RuntimeError::NotConfigured)
    });

    assert!(matches!(result, Err(RuntimeError::NotConfigured)));
    assert!(runtime().is_err());
  }

  #[test]
  fn inner_error_restores_outer_runtime() {
    let outer_dir = TempDir::new().unwrap();
    let inner_dir = TempDir::new().unwrap();
    let _reset = TempRuntime::new(None).unwrap();

    let result: Result<(), RuntimeError> = with_runtime(Some(site_config(outer_dir.path(), "testsys")), || {
      let inner: Result<(), RuntimeError> = with_runtime(Some(site_config(inner_dir.path(), "testsys")), || {
        assert_eq!(runtime()?.prefix()?, inner_dir.path());
        Err(RuntimeError::InvalidVariable {
          environment: "inner".to_string(),
          name: "1BAD".to_string(),
        })
      });
      assert!(matches!(inner, Err(RuntimeError::InvalidVariable { .. })));

      assert_eq!(runtime()?.prefix()?, outer_dir.path());
      inner
    });

    assert!(matches!(result, Err(RuntimeError::InvalidVariable { environment, .. }) if environment == "inner"));
    assert!(matches!(runtime(), Err(RuntimeError::NotConfigured)));
  }

  #[test]
  fn inner_panic_restores_outer_runtime() {
    let outer_dir = TempDir::new().unwrap();
    let inner_dir = TempDir::new().unwrap();
    let _reset = TempRuntime::new(None).unwrap();

    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
      let _: Result<(), RuntimeError> = with_runtime(Some(site_config(outer_dir.path(), "testsys")), || {
        let caught = std::panic::catch_unwind(AssertUnwindSafe(|| {
          let _: Result<(), RuntimeError> = with_runtime(Some(site_config(inner_dir.path(), "testsys")), || {
            panic!("inner panic");
          });
        }));
        assert!(caught.is_err());
        assert_eq!(runtime()?.prefix()?, outer_dir.path());

        panic!("outer panic");
      });
    }));

    assert!(result.is_err());
    assert!(matches!(runtime(), Err(RuntimeError::NotConfigured)));
  }

  #[test]
  fn get_option_sees_sticky_options() {
    let temp = TempDir::new().unwrap();
    let mut config = site_config(temp.path(), "testsys");
    config.add_sticky_option("systems/0/descr", "overridden");
    let _rt = TempRuntime::new(Some(config)).unwrap();

    let rt = runtime().unwrap();
    assert_eq!(rt.get_option("systems/0/descr").unwrap(), Value::from("overridden"));
    assert_eq!(rt.system().descr(), "overridden");
  }
}
