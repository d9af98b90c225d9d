//! Main application orchestration and execution

use crate::{
    cli::{Cli, EnvArgs},
    config::{load_config, validate_config, EnvManager, ValidationLevel},
    error::{AppError, Result},
    executor::{create_scenario, run_server, ExecutionResults, Interrupt, ScenarioExecutor, ServerActivity},
    logging::LoggerFactory,
    models::Config,
    output::{format_bytes, OutputCoordinator, OutputFormatterFactory},
};

/// Main application struct that coordinates all components
pub struct App {
    config: Config,
    cli: Cli,
    coordinator: OutputCoordinator,
}

impl App {
    /// Load configuration and print validation warnings
    pub fn new(cli: Cli) -> Result<Self> {
        let config = load_config(cli.clone())?;
        let warnings = validate_config(&config, cli.scenario_kind())?;

        let formatter = OutputFormatterFactory::create_formatter(config.enable_color && cli.use_colors(), config.verbose);
        let coordinator = OutputCoordinator::with_verbose(formatter, config.verbose);

        for warning in &warnings {
            if warning.level == ValidationLevel::Error {
                return Err(AppError::config(warning.message.clone()));
            }
            if warning.level == ValidationLevel::Warning || config.verbose {
                eprintln!("{}", warning.format(config.enable_color));
            }
        }

        Ok(Self { config, cli, coordinator })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the selected subcommand until it completes or Ctrl-C
    pub async fn run(self) -> Result<()> {
        let factory = LoggerFactory::new(self.config.clone());
        let logger = factory.create_logger("APP").await;
        let kind = self.cli.scenario_kind();
        let command = kind.map(|k| k.name()).unwrap_or("server");
        crate::log_debug!(logger, "Starting {} v{} ({})", crate::PKG_NAME, crate::VERSION, command);

        let interrupt = Interrupt::on_ctrl_c();
        let outcome = match kind {
            None => {
                let outcome = self.run_server_mode(&interrupt).await;
                crate::log_info!(logger, "Server mode finished");
                outcome
            }
            Some(kind) => {
                if self.config.verbose {
                    println!(
                        "Running {} against {}{}",
                        kind,
                        self.config.endpoint,
                        if self.config.remote { "" } else { " (embedded server)" }
                    );
                }
                let executor = ScenarioExecutor::new(self.config.clone(), interrupt);
                match executor.execute(&[create_scenario(kind)]).await {
                    Ok(results) => {
                        if results.execution_summary.interrupted {
                            crate::log_warn!(logger, "{} interrupted before completion", kind);
                        }
                        self.report(&results)
                    }
                    Err(e) => Err(e),
                }
            }
        };

        if let Err(e) = &outcome {
            factory.create_error_logger().log_error(e, Some(command), None).await;
        }
        outcome
    }

    async fn run_server_mode(&self, interrupt: &Interrupt) -> Result<()> {
        let coordinator = &self.coordinator;
        let report = run_server(&self.config, interrupt, |activity: ServerActivity| {
            match coordinator.display_server_activity(&activity) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("{}", e),
            }
        })
        .await?;

        println!(
            "{}",
            self.coordinator.display_success(&format!(
                "Server stopped after {} connection(s), {} message(s), {} received",
                report.total_connections,
                report.statistics.messages_received,
                format_bytes(report.statistics.bytes_received)
            ))?
        );
        Ok(())
    }

    fn report(&self, results: &ExecutionResults) -> Result<()> {
        if self.cli.quiet {
            println!("{}", self.coordinator.display_quick_summary(results)?);
        } else {
            println!("{}", self.coordinator.display_results(results)?);
        }

        if results.execution_summary.interrupted {
            println!("{}", self.coordinator.display_warning("Run interrupted; statistics cover completed operations")?);
            return Ok(());
        }
        if results.has_failures() {
            return Err(AppError::test_execution(format!(
                "{} of {} operations did not succeed",
                results.execution_summary.total_operations - results.execution_summary.successful_operations,
                results.execution_summary.total_operations
            )));
        }
        Ok(())
    }
}

/// `tmt env`: list the supported variables, print or write an example file,
/// or check the current values
pub fn run_env_command(args: &EnvArgs) -> Result<()> {
    if let Some(path) = &args.write {
        EnvManager::save_example_env_file(path)?;
        println!("Wrote example configuration to {}", path.display());
    }
    if args.example {
        print!("{}", EnvManager::create_example_env_content());
    }
    if args.check {
        let mut problems = EnvManager::validate_current_env();
        match EnvManager::check_env_file(&args.file)? {
            Some(file_problems) => problems.extend(file_problems),
            None => println!("{} not found, checking the environment only", args.file.display()),
        }
        if !problems.is_empty() {
            for problem in &problems {
                eprintln!("{}", problem);
            }
            return Err(AppError::config(format!("{} invalid configuration value(s)", problems.len())));
        }
        println!("Configuration OK");
    }
    if args.write.is_none() && !args.example && !args.check {
        print!("{}", EnvManager::display_env_help());
    }
    Ok(())
}
