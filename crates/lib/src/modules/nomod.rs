use super::{ModuleError, ModuleSystem};

/// Backend for systems without a module system.
///
/// Every module is reported as loaded, so environments that list modules are
/// still considered active once their variables are set.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModules;

impl ModuleSystem for NoModules {
  fn name(&self) -> &str {
    "nomod"
  }

  fn loaded_modules(&self) -> Vec<String> {
    Vec::new()
  }

  fn conflicted_modules(&self, _name: &str) -> Result<Vec<String>, ModuleError> {
    Ok(Vec::new())
  }

  fn load(&self, _name: &str) -> Result<(), ModuleError> {
    Ok(())
  }

  fn unload_module(&self, _name: &str) -> Result<(), ModuleError> {
    Ok(())
  }

  fn is_module_loaded(&self, _name: &str) -> bool {
    true
  }

  fn emit_load_commands(&self, _name: &str) -> Vec<String> {
    Vec::new()
  }

  fn emit_unload_commands(&self, _name: &str) -> Vec<String> {
    Vec::new()
  }

  fn searchpath(&self) -> Vec<String> {
    Vec::new()
  }

  fn searchpath_add(&self, _paths: &[&str]) -> Result<(), ModuleError> {
    Ok(())
  }

  fn searchpath_remove(&self, _paths: &[&str]) -> Result<(), ModuleError> {
    Ok(())
  }
}
