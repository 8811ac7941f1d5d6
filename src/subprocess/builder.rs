use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::runner::ProcessCommand;

pub struct ProcessCommandBuilder {
    command: ProcessCommand,
}

impl ProcessCommandBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            command: ProcessCommand {
                program: program.to_string(),
                args: Vec::new(),
                env: HashMap::new(),
                working_dir: None,
                timeout: None,
            },
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.command.args.push(arg.to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.command
            .args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.command.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.command.working_dir = Some(dir.to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.command.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ProcessCommand {
        self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_command_with_args_and_env() {
        let command = ProcessCommandBuilder::new("gcloud")
            .arg("projects")
            .args(["create", "demo-1"])
            .env("CLOUDSDK_CORE_DISABLE_PROMPTS", "1")
            .timeout(Duration::from_secs(30))
            .build();

        assert_eq!(command.program, "gcloud");
        assert_eq!(command.args, vec!["projects", "create", "demo-1"]);
        assert_eq!(
            command.env.get("CLOUDSDK_CORE_DISABLE_PROMPTS"),
            Some(&"1".to_string())
        );
        assert_eq!(command.timeout, Some(Duration::from_secs(30)));
        assert_eq!(command.display(), "gcloud projects create demo-1");
    }
}
