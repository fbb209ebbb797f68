//! The env handle and the shared world behind it.
//!
//! An [`Env`] is the per-caller entry point: it carries the ambient
//! [`Context`] and a reference-counted handle on the [`World`], which
//! registers the loaded plugins. Handles are cheap to clone; cloning
//! shares the world and snapshots the current context. The world is
//! torn down when the last handle drops, cascading destruction through
//! the ownership tree.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use tracing::debug;

use crate::context::{ChannelSet, Context};
use crate::error::{Error, Result};
use crate::node::NodeRef;
use crate::nodes;
use crate::plugin::{ParamSet, Plugin};
use crate::types::Count;

/// The process-local registry of loaded plugins.
#[derive(Debug, Default)]
pub struct World {
    plugins: RefCell<Vec<Rc<Plugin>>>,
}

impl World {
    fn register(&self, plugin: Plugin) -> Result<()> {
        let mut plugins = self.plugins.borrow_mut();
        if plugins
            .iter()
            .any(|p| p.identifier() == plugin.identifier())
        {
            return Err(Error::Exists);
        }
        debug!(identifier = plugin.identifier(), "registering plugin");
        plugins.push(Rc::new(plugin));
        Ok(())
    }

    fn find(&self, identifier: &str) -> Option<Rc<Plugin>> {
        self.plugins
            .borrow()
            .iter()
            .find(|p| p.identifier() == identifier)
            .cloned()
    }
}

/// A handle on the engine: ambient context plus shared plugin world.
///
/// Derefs to [`Context`], so context getters and setters are available
/// directly on the handle.
#[derive(Debug)]
pub struct Env {
    context: Context,
    world: Rc<World>,
}

impl Default for Env {
    fn default() -> Env {
        Env::new()
    }
}

impl Clone for Env {
    /// A new handle sharing the same world, starting from the current
    /// ambient context.
    fn clone(&self) -> Env {
        Env {
            context: self.context.clone(),
            world: Rc::clone(&self.world),
        }
    }
}

impl Deref for Env {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.context
    }
}

impl DerefMut for Env {
    fn deref_mut(&mut self) -> &mut Context {
        &mut self.context
    }
}

impl Env {
    /// A fresh world with the built-in plugins registered and a default
    /// context: 44100 Hz, 120 bpm, mono, mixlength 1024.
    pub fn new() -> Env {
        let env = Env {
            context: Context::default(),
            world: Rc::new(World::default()),
        };
        for plugin in nodes::builtin_plugins() {
            // A fresh world cannot already contain the builtins.
            env.world
                .register(plugin)
                .expect("builtin plugin registered twice");
        }
        env
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Register an additional plugin. Fails with
    /// [`Error::Exists`] on a duplicate identifier.
    pub fn register_plugin(&self, plugin: Plugin) -> Result<()> {
        self.world.register(plugin)
    }

    /// Look a plugin up by identifier.
    pub fn find_plugin(&self, identifier: &str) -> Option<Rc<Plugin>> {
        self.world.find(identifier)
    }

    /// Identifiers of every registered plugin.
    pub fn plugin_identifiers(&self) -> Vec<&'static str> {
        self.world
            .plugins
            .borrow()
            .iter()
            .map(|p| p.identifier())
            .collect()
    }

    /// Instantiate a node from a registered plugin with the given
    /// keyed parameters.
    pub fn create(&mut self, identifier: &str, params: &ParamSet) -> Result<NodeRef> {
        let plugin = self.find_plugin(identifier).ok_or(Error::NoEntity)?;
        let node = (plugin.init)(self, params)?;
        node.borrow_mut().base_mut().plugin = Some(Rc::clone(&plugin));
        Ok(node)
    }

    /// Ask a plugin to complete a partial parameter set. `Noop` when
    /// the plugin offers no suggestions.
    pub fn suggest(&self, identifier: &str, params: ParamSet) -> Result<ParamSet> {
        let plugin = self.find_plugin(identifier).ok_or(Error::NoEntity)?;
        match plugin.suggest {
            Some(suggest) => Ok(suggest(self, &plugin, params)),
            None => Err(Error::Noop),
        }
    }

    // Context conveniences mirroring the deref'd setters, for call
    // sites holding the handle mutably.

    pub fn set_tempo(&mut self, tempo: f64) -> f64 {
        self.context.set_tempo(tempo)
    }

    pub fn set_samplerate(&mut self, samplerate: f64) -> f64 {
        self.context.set_samplerate(samplerate)
    }

    pub fn set_mixlength(&mut self, mixlength: Count) -> Count {
        self.context.set_mixlength(mixlength)
    }

    pub fn set_channels(&mut self, channels: ChannelSet) -> ChannelSet {
        self.context.set_channels(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let env = Env::new();
        let ids = env.plugin_identifiers();
        assert!(ids.contains(&"builtin::noise"));
        assert!(ids.contains(&"builtin::squaretone"));
        assert!(ids.contains(&"builtin::gain"));
        assert!(ids.contains(&"builtin::wavfile"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let env = Env::new();
        let dup = crate::nodes::noise::plugin();
        assert_eq!(env.register_plugin(dup).unwrap_err(), Error::Exists);
    }

    #[test]
    fn cloned_handles_share_the_world() {
        let env = Env::new();
        let mut other = env.clone();
        other.set_tempo(90.0);
        assert_eq!(env.tempo(), 120.0, "context is per-handle");
        assert!(other.find_plugin("builtin::noise").is_some());
    }

    #[test]
    fn unknown_plugin_lookup_fails() {
        let mut env = Env::new();
        let err = env.create("builtin::theremin", &ParamSet::new()).unwrap_err();
        assert_eq!(err, Error::NoEntity);
    }
}
