//! Host-supplied verbs, handed to a VM at construction time.
//!
//! Commands and sensors share one namespace: registering a name replaces
//! whatever was bound to it before, of either kind.

use std::fmt;

use log::warn;
use rustc_hash::FxHashMap;

use crate::error::RuntimeErrorKind;
use crate::value::Value;

pub type CommandFn = Box<dyn FnMut(&[Value]) -> anyhow::Result<()>>;
pub type SensorFn = Box<dyn Fn(&[Value]) -> anyhow::Result<Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKind {
    Command,
    Sensor,
}

enum NativeVerb {
    Command(CommandFn),
    Sensor(SensorFn),
}

impl NativeVerb {
    fn kind(&self) -> NativeKind {
        match self {
            NativeVerb::Command(_) => NativeKind::Command,
            NativeVerb::Sensor(_) => NativeKind::Sensor,
        }
    }
}

#[derive(Default)]
pub struct NativeRegistry {
    verbs: FxHashMap<String, NativeVerb>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_command(
        &mut self,
        name: impl Into<String>,
        command: impl FnMut(&[Value]) -> anyhow::Result<()> + 'static,
    ) {
        self.insert(name.into(), NativeVerb::Command(Box::new(command)));
    }

    pub fn register_sensor(
        &mut self,
        name: impl Into<String>,
        sensor: impl Fn(&[Value]) -> anyhow::Result<Value> + 'static,
    ) {
        self.insert(name.into(), NativeVerb::Sensor(Box::new(sensor)));
    }

    pub fn with_command(
        mut self,
        name: impl Into<String>,
        command: impl FnMut(&[Value]) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.register_command(name, command);
        self
    }

    pub fn with_sensor(
        mut self,
        name: impl Into<String>,
        sensor: impl Fn(&[Value]) -> anyhow::Result<Value> + 'static,
    ) -> Self {
        self.register_sensor(name, sensor);
        self
    }

    pub fn kind(&self, name: &str) -> Option<NativeKind> {
        self.verbs.get(name).map(NativeVerb::kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.verbs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.verbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verbs.is_empty()
    }

    /// Invokes `name` as a statement-level call. Commands yield `null`.
    pub(crate) fn invoke(
        &mut self,
        name: &str,
        args: &[Value],
    ) -> Option<Result<Value, RuntimeErrorKind>> {
        let verb = self.verbs.get_mut(name)?;
        let result = match verb {
            NativeVerb::Command(command) => command(args).map(|()| Value::Null),
            NativeVerb::Sensor(sensor) => sensor(args),
        };
        Some(result.map_err(|error| native_failure(name, &error)))
    }

    /// Queries a sensor without touching commands; `None` if `name` is not a sensor.
    pub(crate) fn sense(&self, name: &str, args: &[Value]) -> Option<Result<Value, RuntimeErrorKind>> {
        match self.verbs.get(name)? {
            NativeVerb::Sensor(sensor) => {
                Some(sensor(args).map_err(|error| native_failure(name, &error)))
            }
            NativeVerb::Command(_) => None,
        }
    }

    fn insert(&mut self, name: String, verb: NativeVerb) {
        let kind = verb.kind();
        if let Some(previous) = self.verbs.insert(name.clone(), verb) {
            warn!(
                "native '{name}' re-registered as {kind:?}, replacing {:?}",
                previous.kind()
            );
        }
    }
}

impl fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self
            .verbs
            .iter()
            .map(|(name, verb)| (name.as_str(), verb.kind()))
            .collect::<Vec<_>>();
        names.sort_unstable_by_key(|(name, _)| *name);
        f.debug_map().entries(names).finish()
    }
}

fn native_failure(name: &str, error: &anyhow::Error) -> RuntimeErrorKind {
    RuntimeErrorKind::NativeFailure {
        name: name.to_string(),
        message: format!("{error:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{NativeKind, NativeRegistry};
    use crate::error::RuntimeErrorKind;
    use crate::value::Value;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn last_registration_wins_across_kinds() {
        let mut registry = NativeRegistry::new();
        registry.register_command("probe", |_| Ok(()));
        registry.register_sensor("probe", |_| Ok(Value::Boolean(true)));
        assert_eq!(registry.kind("probe"), Some(NativeKind::Sensor));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.sense("probe", &[]),
            Some(Ok(Value::Boolean(true)))
        );
    }

    #[test]
    fn commands_observe_arguments_and_return_null() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut registry = NativeRegistry::new().with_command("move", move |args| {
            sink.borrow_mut().push(args.to_vec());
            Ok(())
        });
        let result = registry.invoke("move", &[Value::from("forward")]);
        assert_eq!(result, Some(Ok(Value::Null)));
        assert_eq!(seen.borrow().as_slice(), &[vec![Value::from("forward")]]);
        assert_eq!(registry.sense("move", &[]), None);
        assert_eq!(registry.invoke("fly", &[]), None);
    }

    #[test]
    fn callback_errors_become_native_failures() {
        let registry =
            NativeRegistry::new().with_sensor("frontClear", |_| anyhow::bail!("no maze loaded"));
        assert_eq!(
            registry.sense("frontClear", &[]),
            Some(Err(RuntimeErrorKind::NativeFailure {
                name: "frontClear".to_string(),
                message: "no maze loaded".to_string(),
            }))
        );
    }
}
