use anyhow::{Context as _, Result};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::debug;

use start_core::Agent;
use start_template::{Placeholders, ShellSpec};

/// Everything needed to build the agent invocation.
#[derive(Debug)]
pub struct ExecRequest<'a> {
    pub agent_name: &'a str,
    pub agent: &'a Agent,
    pub role_text: &'a str,
    /// Temp file holding the resolved role, for `{{.role_file}}`.
    pub role_file: Option<&'a Path>,
    pub prompt: &'a str,
    /// Requested model; mapped through the agent's alias table.
    pub model: Option<&'a str>,
}

/// Substitute the execution dictionary into the agent's command template.
///
/// Argv-valued placeholders (`prompt`, `role`, `role_file`) are wrapped in
/// single quotes with embedded-quote escaping; environment variables inside
/// the prompt are never expanded because the values are injected after any
/// shell would have seen them.
pub fn build_command(req: &ExecRequest<'_>) -> Result<String> {
    let model = req.agent.resolve_model(req.model).unwrap_or_default();
    let role_file = req
        .role_file
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    let dict = Placeholders::new()
        .set("bin", req.agent.bin_or(req.agent_name))
        .set("model", model)
        .set("prompt", quote(req.prompt))
        .set("role", quote(req.role_text))
        .set("role_file", quote(&role_file));

    let command = dict.render(&req.agent.command)?;
    debug!(agent = req.agent_name, "built agent command");
    Ok(command)
}

/// Single-quote wrapping with embedded-quote escaping.
fn quote(value: &str) -> String {
    shell_escape::unix::escape(Cow::Borrowed(value)).into_owned()
}

/// Artefact directory written by `--dry-run`.
#[derive(Debug)]
pub struct DryRunArtifacts {
    pub dir: PathBuf,
    pub role_file: PathBuf,
    pub prompt_file: PathBuf,
    pub command_file: PathBuf,
}

/// Write `role.md`, `prompt.md`, and `command.txt` into a fresh timestamped
/// directory under the system temp dir (`start-YYYYMMDDHHmmss`, numeric
/// suffix on second-level collisions).
pub fn write_dry_run_artifacts(
    role_text: &str,
    prompt: &str,
    command: &str,
) -> Result<DryRunArtifacts> {
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();
    let base = std::env::temp_dir();

    let mut dir = base.join(format!("start-{stamp}"));
    let mut suffix = 0;
    while dir.exists() {
        suffix += 1;
        dir = base.join(format!("start-{stamp}-{suffix}"));
    }
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let artifacts = DryRunArtifacts {
        role_file: dir.join("role.md"),
        prompt_file: dir.join("prompt.md"),
        command_file: dir.join("command.txt"),
        dir,
    };
    std::fs::write(&artifacts.role_file, role_text)?;
    std::fs::write(&artifacts.prompt_file, prompt)?;
    std::fs::write(&artifacts.command_file, command)?;
    Ok(artifacts)
}

/// Replace the current process with the agent command, run through the
/// resolved shell. Only returns on failure.
pub fn exec_agent(shell: &ShellSpec, command: &str, workdir: &Path) -> Result<()> {
    let mut cmd = std::process::Command::new(&shell.program);
    cmd.args(&shell.args).arg(command).current_dir(workdir);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let err = cmd.exec();
        Err(err).with_context(|| format!("failed to exec {}", shell.program))
    }

    #[cfg(not(unix))]
    {
        let status = cmd
            .status()
            .with_context(|| format!("failed to run {}", shell.program))?;
        std::process::exit(status.code().unwrap_or(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn agent(command: &str) -> Agent {
        Agent {
            command: command.into(),
            bin: Some("claude".into()),
            default_model: Some("sonnet".into()),
            models: BTreeMap::from([("fast".to_string(), "claude-3-5-haiku".to_string())]),
            ..Default::default()
        }
    }

    fn request<'a>(agent: &'a Agent, prompt: &'a str) -> ExecRequest<'a> {
        ExecRequest {
            agent_name: "claude",
            agent,
            role_text: "You are helpful.",
            role_file: None,
            prompt,
            model: None,
        }
    }

    #[test]
    fn substitutes_bin_model_and_quoted_prompt() {
        let agent = agent("{{.bin}} --model {{.model}} -p {{.prompt}}");
        let command = build_command(&request(&agent, "hello world")).unwrap();
        assert_eq!(command, "claude --model sonnet -p 'hello world'");
    }

    #[test]
    fn model_alias_mapping_and_passthrough() {
        let agent = agent("{{.bin}} --model {{.model}}");
        let mut req = request(&agent, "");
        req.model = Some("fast");
        assert_eq!(
            build_command(&req).unwrap(),
            "claude --model claude-3-5-haiku"
        );

        req.model = Some("anything-else");
        assert_eq!(
            build_command(&req).unwrap(),
            "claude --model anything-else"
        );
    }

    #[test]
    fn embedded_quotes_are_escaped() {
        let agent = agent("{{.bin}} -p {{.prompt}}");
        let command = build_command(&request(&agent, "don't break")).unwrap();
        assert_eq!(command, r#"claude -p 'don'\''t break'"#);
    }

    #[test]
    fn environment_variables_stay_literal() {
        let agent = agent("{{.bin}} -p {{.prompt}}");
        let command = build_command(&request(&agent, "echo $HOME")).unwrap();
        assert!(command.contains("$HOME"));
        // Single quotes keep the variable inert for the shell too.
        assert!(command.contains("'echo $HOME'"));
    }

    #[test]
    fn role_file_placeholder_uses_temp_path() {
        let agent = agent("{{.bin}} --system {{.role_file}}");
        let mut req = request(&agent, "");
        let path = Path::new("/work/.start/temp/role-assistant.md");
        req.role_file = Some(path);
        // Plain paths need no quoting; the escaper only wraps when required.
        assert_eq!(
            build_command(&req).unwrap(),
            "claude --system /work/.start/temp/role-assistant.md"
        );
    }

    #[test]
    fn unknown_placeholder_in_agent_command_fails() {
        let agent = agent("{{.bin}} {{.promt}}");
        assert!(build_command(&request(&agent, "x")).is_err());
    }

    #[test]
    fn dry_run_writes_three_artifacts() {
        let artifacts = write_dry_run_artifacts("role body", "prompt body", "cmd").unwrap();
        assert_eq!(
            std::fs::read_to_string(&artifacts.role_file).unwrap(),
            "role body"
        );
        assert_eq!(
            std::fs::read_to_string(&artifacts.prompt_file).unwrap(),
            "prompt body"
        );
        assert_eq!(
            std::fs::read_to_string(&artifacts.command_file).unwrap(),
            "cmd"
        );
        let name = artifacts.dir.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("start-"));
        std::fs::remove_dir_all(&artifacts.dir).unwrap();
    }

    #[test]
    fn dry_run_collision_gets_numeric_suffix() {
        let first = write_dry_run_artifacts("", "", "").unwrap();
        let second = write_dry_run_artifacts("", "", "").unwrap();
        // Same second, different directory.
        assert_ne!(first.dir, second.dir);
        std::fs::remove_dir_all(&first.dir).unwrap();
        std::fs::remove_dir_all(&second.dir).unwrap();
    }
}
