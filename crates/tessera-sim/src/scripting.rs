use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use mlua::prelude::*;

use crate::collaborators::LogicSystem;
use crate::error::SceneError;

/// Lua logic. Each script runs in its own environment table that falls back
/// to the (sandboxed) globals, and may define `update(dt)` to be called every
/// frame while loaded.
pub struct ScriptedLogic {
    lua: Lua,
    /// Registered sources by script name.
    sources: HashMap<String, String>,
    /// Environments of scripts that have run, in run order.
    loaded: Vec<(String, LuaRegistryKey)>,
    log: Rc<RefCell<Vec<String>>>,
}

impl ScriptedLogic {
    pub fn new() -> Result<Self, SceneError> {
        let lua = Lua::new();

        // Disable dangerous standard library functions
        let globals = lua.globals();
        globals.set("os", LuaNil).map_err(script_error("<sandbox>"))?;
        globals.set("io", LuaNil).map_err(script_error("<sandbox>"))?;
        globals.set("loadfile", LuaNil).map_err(script_error("<sandbox>"))?;
        globals.set("dofile", LuaNil).map_err(script_error("<sandbox>"))?;

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let log_fn = lua
            .create_function(move |_, msg: String| {
                tracing::info!("[Lua] {}", msg);
                sink.borrow_mut().push(msg);
                Ok(())
            })
            .map_err(script_error("<api>"))?;
        globals.set("log", log_fn).map_err(script_error("<api>"))?;
        drop(globals);

        Ok(Self {
            lua,
            sources: HashMap::new(),
            loaded: Vec::new(),
            log,
        })
    }

    pub fn register_script(&mut self, name: &str, source: impl Into<String>) {
        if self.sources.insert(name.to_string(), source.into()).is_some() {
            tracing::debug!("Replaced script '{}'", name);
        }
    }

    pub fn register_file(&mut self, name: &str, path: &Path) -> Result<(), SceneError> {
        let code = std::fs::read_to_string(path).map_err(|e| SceneError::Script {
            name: name.to_string(),
            message: format!("failed to read {:?}: {}", path, e),
        })?;
        self.register_script(name, code);
        Ok(())
    }

    pub fn has_script(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// Messages passed to `log()` so far.
    pub fn log_lines(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// Read a value a loaded script left in its environment.
    pub fn script_value<T: FromLua>(&self, script: &str, key: &str) -> Option<T> {
        let (_, env_key) = self.loaded.iter().find(|(name, _)| name == script)?;
        let env: LuaTable = self.lua.registry_value(env_key).ok()?;
        env.get(key).ok()
    }

    fn execute(&mut self, name: &str) -> Result<(), SceneError> {
        let Some(code) = self.sources.get(name) else {
            return Ok(());
        };

        let env = self.lua.create_table().map_err(script_error(name))?;
        let meta = self.lua.create_table().map_err(script_error(name))?;
        meta.set("__index", self.lua.globals())
            .map_err(script_error(name))?;
        env.set_metatable(Some(meta));

        self.lua
            .load(code.as_str())
            .set_name(name)
            .set_environment(env.clone())
            .exec()
            .map_err(script_error(name))?;

        let key = self
            .lua
            .create_registry_value(env)
            .map_err(script_error(name))?;
        self.loaded.retain(|(loaded, _)| loaded != name);
        self.loaded.push((name.to_string(), key));
        Ok(())
    }
}

fn script_error(name: &str) -> impl Fn(LuaError) -> SceneError + '_ {
    move |e| SceneError::Script {
        name: name.to_string(),
        message: e.to_string(),
    }
}

impl LogicSystem for ScriptedLogic {
    fn run_script(&mut self, name: &str) -> bool {
        if !self.sources.contains_key(name) {
            return false;
        }
        match self.execute(name) {
            Ok(()) => {
                tracing::info!("Ran script '{}'", name);
                true
            }
            Err(e) => {
                tracing::error!("{}", e);
                false
            }
        }
    }

    fn update_bricks(&mut self, dt: f32) {
        for (name, key) in &self.loaded {
            let env: LuaTable = match self.lua.registry_value(key) {
                Ok(t) => t,
                Err(_) => continue,
            };
            let func: LuaFunction = match env.get("update") {
                Ok(f) => f,
                Err(_) => continue,
            };
            if let Err(e) = func.call::<()>(dt) {
                tracing::error!("Script error in '{}'.update: {}", name, e);
            }
        }
    }

    fn unload_scripts(&mut self) {
        for (name, key) in self.loaded.drain(..) {
            if let Err(e) = self.lua.remove_registry_value(key) {
                tracing::warn!("Failed to release script '{}': {}", name, e);
            }
        }
        self.lua.expire_registry_values();
    }

    fn notify_scene_destroyed(&mut self) {
        tracing::debug!("Scene destroyed, {} scripts still loaded", self.loaded.len());
    }
}
