//! Console command allow-list.

/// One allow-list rule, matched against the trimmed, lowercased command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRule {
    Exact(String),
    Prefix(String),
    Suffix(String),
}

impl CommandRule {
    fn matches(&self, command: &str) -> bool {
        match self {
            Self::Exact(s) => command == s,
            Self::Prefix(s) => command.starts_with(s.as_str()),
            Self::Suffix(s) => command.ends_with(s.as_str()),
        }
    }
}

/// Which console commands the server may run through `EXECUTE_COMMAND`.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    rules: Vec<CommandRule>,
}

impl CommandPolicy {
    /// Multi-line commands are always refused: a console reading line by line
    /// would run the trailing lines unchecked.
    pub fn is_allowed(&self, command: &str) -> bool {
        if command.chars().any(char::is_control) {
            return false;
        }
        let normalized = command.trim().to_lowercase();
        self.rules.iter().any(|rule| rule.matches(&normalized))
    }
}

impl Default for CommandPolicy {
    fn default() -> Self {
        let exact = ["reload", "rl"].map(|s| CommandRule::Exact(s.to_string()));
        let prefixes = [
            "plugman ",
            "say ",
            "kick ",
            "whitelist ",
            "gamerule ",
            "worldborder ",
        ]
        .map(|s| CommandRule::Prefix(s.to_string()));

        let mut rules = Vec::new();
        rules.extend(exact);
        rules.push(CommandRule::Suffix(" reload".to_string()));
        rules.extend(prefixes);
        Self { rules }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allows_admin_commands() {
        let policy = CommandPolicy::default();
        for cmd in [
            "reload",
            "RL",
            "  essentials reload ",
            "plugman load Foo",
            "say hi",
            "kick Steve",
            "whitelist add Alex",
            "gamerule doDaylightCycle false",
            "worldborder set 5000",
        ] {
            assert!(policy.is_allowed(cmd), "{cmd} should be allowed");
        }
    }

    #[test]
    fn test_default_refuses_everything_else() {
        let policy = CommandPolicy::default();
        for cmd in [
            "rm -rf /",
            "stop",
            "op Steve",
            "say",
            "reloadx",
            "say hi\nstop",
            "",
        ] {
            assert!(!policy.is_allowed(cmd), "{cmd:?} should be refused");
        }
    }
}
