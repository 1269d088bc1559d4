use crate::config::task_config::CodegenConfig;
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "safe-codegen")]
#[command(about = "Generate code files from task descriptions with an AI assistant")]
#[command(
    after_help = "The API key is read from `assistant.api_key` or the OPENAI_API_KEY environment variable. \
                  `.env` files are not loaded; export the variable in the shell instead."
)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "codegen-config.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the output directory from config
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Override the assistant model from config
    #[arg(long)]
    pub model: Option<String>,

    /// Dry run - validate config and task filenames without calling the API
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// 套用命令列覆蓋設定
    pub fn apply_overrides(&self, config: &mut CodegenConfig) {
        if let Some(dir) = &self.output_dir {
            tracing::info!("🔧 Output directory overridden to: {}", dir);
            config.output.directory = dir.clone();
        }
        if let Some(model) = &self.model {
            tracing::info!("🔧 Model overridden to: {}", model);
            config.assistant.model = model.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_overrides() {
        let args = CliArgs::parse_from(["safe-codegen"]);
        assert_eq!(args.config, "codegen-config.toml");
        assert!(!args.dry_run);

        let args = CliArgs::parse_from([
            "safe-codegen",
            "-c",
            "tasks.toml",
            "--output-dir",
            "gen",
            "--model",
            "gpt-4o",
            "--dry-run",
        ]);
        let mut config =
            CodegenConfig::from_toml_str("[[tasks]]\ndescription = \"x\"\nfilename = \"x.py\"\n")
                .unwrap();
        args.apply_overrides(&mut config);

        assert_eq!(args.config, "tasks.toml");
        assert!(args.dry_run);
        assert_eq!(config.output.directory, "gen");
        assert_eq!(config.assistant.model, "gpt-4o");
    }

    #[test]
    fn test_help_names_api_key_sources() {
        use clap::CommandFactory;

        let help = CliArgs::command().render_help().to_string();
        assert!(help.contains("OPENAI_API_KEY"));
        assert!(help.contains(".env"));
    }
}
