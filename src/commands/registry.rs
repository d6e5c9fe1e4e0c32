//! Name and alias lookup for commands.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::builtin::builtin_commands;
use super::Command;
use crate::error::RegistryError;

/// Maps every name and alias (case-insensitively) to its command.
#[derive(Default)]
pub struct CommandRegistry {
    by_name: HashMap<String, Arc<dyn Command>>,
    ordered: Vec<Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in command.
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for command in builtin_commands() {
            registry.register(command)?;
        }
        debug!(commands = registry.len(), "Built-in commands registered");
        Ok(registry)
    }

    /// Add a command. Nothing is registered if any of its names collides.
    pub fn register(&mut self, command: Arc<dyn Command>) -> Result<(), RegistryError> {
        let descriptor = command.descriptor();
        let names: Vec<String> = descriptor.names().map(str::to_lowercase).collect();

        for (i, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(RegistryError::EmptyName);
            }
            let existing = self
                .by_name
                .get(name)
                .map(|c| c.descriptor().name)
                .or_else(|| names[..i].contains(name).then_some(descriptor.name));
            if let Some(existing) = existing {
                return Err(RegistryError::DuplicateName {
                    name: name.clone(),
                    existing: existing.to_string(),
                });
            }
        }

        for name in names {
            self.by_name.insert(name, command.clone());
        }
        self.ordered.push(command);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.by_name.get(&name.to_lowercase()).cloned()
    }

    /// Commands in registration order.
    pub fn commands(&self) -> &[Arc<dyn Command>] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{local, CommandArgs, CommandContext, CommandDescriptor, CommandResult};
    use crate::error::CommandError;
    use async_trait::async_trait;

    struct Fixed(&'static CommandDescriptor);

    #[async_trait]
    impl Command for Fixed {
        fn descriptor(&self) -> &'static CommandDescriptor {
            self.0
        }

        async fn execute(
            &self,
            _ctx: &CommandContext<'_>,
            _args: &CommandArgs,
        ) -> Result<CommandResult, CommandError> {
            Ok(local(self.0.name))
        }
    }

    const fn descriptor(name: &'static str, aliases: &'static [&'static str]) -> CommandDescriptor {
        CommandDescriptor {
            name,
            aliases,
            usage: "",
            in_channel: true,
            in_private: true,
            requires_connection: false,
        }
    }

    static HELLO: CommandDescriptor = descriptor("hello", &["hi"]);
    static GREET: CommandDescriptor = descriptor("greet", &["HI"]);
    static ECHO: CommandDescriptor = descriptor("echo", &["echo"]);

    #[test]
    fn test_lookup_by_name_and_alias_ignores_case() {
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(Fixed(&HELLO))).unwrap();
        assert_eq!(registry.lookup("HELLO").unwrap().descriptor().name, "hello");
        assert_eq!(registry.lookup("Hi").unwrap().descriptor().name, "hello");
        assert!(registry.lookup("bye").is_none());
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(Fixed(&HELLO))).unwrap();

        let err = registry.register(Arc::new(Fixed(&GREET))).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateName {
                name: "hi".into(),
                existing: "hello".into()
            }
        );
        // Nothing from the rejected command leaked in
        assert!(registry.lookup("greet").is_none());

        assert!(registry.register(Arc::new(Fixed(&ECHO))).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_builtins_register_cleanly() {
        let registry = CommandRegistry::with_builtins().unwrap();
        for name in ["join", "j", "part", "msg", "me", "kick", "ban", "topic", "raw", "help", "ns"] {
            assert!(registry.lookup(name).is_some(), "missing /{}", name);
        }
    }
}
