mod cli;

use hcl::eval::Evaluate;
use tfscan::documents::{load_default_variables, load_variables, Documents};
use tfscan::evaluator::Evaluator;
use tfscan::graph::Graph;
use tfscan::module::DirectoryModules;
use tfscan::query::ResolvedBlock;
use tfscan::value::{Object, Value};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TFSCAN_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Resolve(resolve_cli) => resolve(resolve_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn resolve(cli: cli::ResolveCommand) -> anyhow::Result<()> {
    let mut documents = Documents::default();
    documents.load_directory(&cli.input.path)?;
    let variables = variables(&cli.input)?;

    let mut graph = Graph::default();
    let loader = DirectoryModules::new(&cli.input.path);
    let mut evaluator = Evaluator::new(
        &mut graph,
        &loader,
        &cli.input.path,
        documents.parsed_blocks(),
        variables,
    );
    evaluator.set_workspace(cli.input.workspace.as_str());
    let evaluation = evaluator.evaluate_all();

    for diagnostic in &evaluation.diagnostics {
        eprintln!("{diagnostic}");
        let mut source = std::error::Error::source(&diagnostic.error);
        while let Some(error) = source {
            eprintln!("  {error}");
            source = error.source();
        }
    }

    let blocks: Vec<ResolvedBlock> = evaluation
        .blocks
        .iter()
        .map(|id| graph.get(*id).resolved())
        .collect();
    output(&cli.output, &blocks)?;
    Ok(())
}

/// Variables in terraform's precedence: defaults files, then --var-file, then --var
fn variables(input: &cli::InputArgs) -> anyhow::Result<Object> {
    let mut variables = load_default_variables(&input.path)?;

    for file_path in &input.var_files {
        variables.extend(load_variables(file_path)?);
    }

    // values that are no valid expression are taken as plain strings
    for (name, expression) in &input.vars {
        let value = expression
            .parse::<hcl_edit::expr::Expression>()
            .ok()
            .and_then(|expr| {
                hcl::Expression::from(expr)
                    .evaluate(&hcl::eval::Context::new())
                    .ok()
            })
            .map(Value::from)
            .unwrap_or_else(|| Value::from(expression.as_str()));
        variables.insert(name.clone(), value);
    }

    Ok(variables)
}

fn output(output: &cli::OutputArgs, blocks: &[ResolvedBlock]) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), blocks)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), blocks)?,
    };

    Ok(())
}

/// (tfscan-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    let mut documents = Documents::default();
    documents.load_directory(&cli.path)?;

    match cli.command {
        cli::DevSubCommand::Documents => println!("{documents:#?}"),
        cli::DevSubCommand::Blocks => println!("{:#?}", documents.parsed_blocks()),
    }

    Ok(())
}
