use clap::Parser;
use gdl::rule::Renderer;
use gdl::{Compiled, Glyph, MemoryFont, Options, Version};
use std::path::{Path, PathBuf};

fn main() {
    if let Err(err) = Cli::parse().run() {
        if !err.is_empty() {
            eprintln!("{err}");
        }
        std::process::exit(1);
    }
}

/// Tools for working with Graphite rule programs.
///
/// Every subcommand reads a JSON file with two fields:
///   `font`, the glyph count, metrics and glyph attributes of the font,
///   and `renderer`, the symbol-resolved rule program.
#[derive(Debug, Parser)]
#[command(
    name = "gdltools",
    author = "The gdltools authors",
    version = "0.1",
    about,
    long_about,
    max_term_width(100)
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Engine version to compile for, like `2.0`.
    ///
    /// The version is raised if the program uses features the version doesn't have.
    #[arg(short = 't', long, default_value = "2.0")]
    target_version: Version,

    /// Fail instead of raising the target version.
    #[arg(long)]
    pin_version: bool,

    /// Increase logging. Pass twice for debug output.
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn run(self) -> Result<(), String> {
        init_logging(self.verbose, self.quiet);
        let options = Options {
            version: self.target_version,
            pin_version: self.pin_version,
            ..Default::default()
        };
        match self.command {
            Command::Check(check) => check.run(&options),
            Command::Compile(compile) => compile.run(&options),
            Command::Fsm(fsm) => fsm.run(&options),
            Command::Code(code) => code.run(&options),
            Command::Run(run) => run.run(options),
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::WARN,
        (false, 1) => tracing::Level::INFO,
        (false, _) => tracing::Level::DEBUG,
    };
    // Fails only if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[derive(Clone, Debug, clap::Subcommand)]
enum Command {
    /// Check that a rule program compiles.
    ///
    /// Warnings are printed to standard error.
    /// The exit code is 1 if the program has errors.
    Check(Check),

    /// Compile a rule program to a Silf table.
    Compile(Compile),

    /// Print the state machine of each pass.
    Fsm(Fsm),

    /// Print the disassembled constraint and action code of each rule.
    Code(Code),

    /// Compile a rule program and run it over a glyph sequence.
    ///
    /// The output glyph IDs are printed on one line.
    /// This uses the reference engine, which has no bidi reordering or justification.
    Run(Run),
}

#[derive(serde::Deserialize)]
struct Input {
    font: MemoryFont,
    renderer: Renderer,
}

fn read_input(path: &Path) -> Result<Input, String> {
    let data = std::fs::read_to_string(path)
        .map_err(|err| format!("Failed to read `{}`: {}", path.display(), err))?;
    let mut input: Input = serde_json::from_str(&data)
        .map_err(|err| format!("Failed to parse `{}`: {}", path.display(), err))?;
    input.font.reindex();
    Ok(input)
}

fn compile(input: &mut Input, options: &Options) -> Result<Compiled, String> {
    let compiled = gdl::compile(&mut input.renderer, &input.font, options)
        .map_err(|failure| failure.to_string())?;
    for warning in &compiled.warnings {
        eprintln!("{warning}");
    }
    Ok(compiled)
}

#[derive(Clone, Debug, Parser)]
struct Check {
    /// Path to the JSON input.
    input: PathBuf,
}

impl Check {
    fn run(&self, options: &Options) -> Result<(), String> {
        let mut input = read_input(&self.input)?;
        let compiled = compile(&mut input, options)?;
        println!(
            "ok: version {}, {} pass{}, {} warning{}",
            compiled.version,
            compiled.passes.len(),
            if compiled.passes.len() == 1 { "" } else { "es" },
            compiled.warnings.len(),
            if compiled.warnings.len() == 1 { "" } else { "s" },
        );
        Ok(())
    }
}

#[derive(Clone, Debug, Parser)]
struct Compile {
    /// Path to the JSON input.
    input: PathBuf,

    /// Output path. Defaults to the input path with the extension `silf`.
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

impl Compile {
    fn run(&self, options: &Options) -> Result<(), String> {
        let mut input = read_input(&self.input)?;
        let compiled = compile(&mut input, options)?;
        let b = gdl::silf::serialize(&compiled)
            .map_err(|err| format!("Failed to serialize the Silf table: {err}"))?;
        let output = match &self.output {
            None => self.input.with_extension("silf"),
            Some(output) => output.clone(),
        };
        std::fs::write(&output, b)
            .map_err(|err| format!("Failed to write `{}`: {}", output.display(), err))?;
        tracing::info!(path = %output.display(), "wrote Silf table");
        Ok(())
    }
}

#[derive(Clone, Debug, Parser)]
struct Fsm {
    /// Path to the JSON input.
    input: PathBuf,

    /// Only print the pass with this global ID.
    #[arg(short = 'p', long)]
    pass: Option<u16>,
}

impl Fsm {
    fn run(&self, options: &Options) -> Result<(), String> {
        let mut input = read_input(&self.input)?;
        let compiled = compile(&mut input, options)?;
        let mut found = false;
        for pass in &compiled.passes {
            if self.pass.is_some_and(|id| id != pass.global_id) {
                continue;
            }
            found = true;
            println!(
                "pass {} ({} table, pass {})",
                pass.global_id,
                pass.table,
                pass.index + 1
            );
            print!("{}", pass.machine);
        }
        if let (Some(id), false) = (self.pass, found) {
            return Err(format!("No pass with global ID {id}"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Parser)]
struct Code {
    /// Path to the JSON input.
    input: PathBuf,
}

impl Code {
    fn run(&self, options: &Options) -> Result<(), String> {
        let mut input = read_input(&self.input)?;
        let compiled = compile(&mut input, options)?;
        for pass in &compiled.passes {
            for rule in &pass.rules {
                println!("pass {} rule {}", pass.global_id, rule.index);
                for (name, code) in [
                    ("constraints", &rule.code.constraints),
                    ("actions", &rule.code.actions),
                ] {
                    println!("  {name}:");
                    let instructions = gdl::code::disassemble(code).map_err(|err| {
                        format!(
                            "Failed to disassemble pass {} rule {}: {}",
                            pass.global_id, rule.index, err
                        )
                    })?;
                    for instruction in instructions {
                        println!("  {instruction}");
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Parser)]
struct Run {
    /// Path to the JSON input.
    input: PathBuf,

    /// Glyph IDs to run the program over.
    #[arg(required = true)]
    glyphs: Vec<u16>,

    /// Set a feature, like `3=1`. May be repeated.
    #[arg(short = 'f', long = "feature", value_parser = parse_feature)]
    features: Vec<(u8, i32)>,

    /// Maximum number of rule firings in one pass.
    #[arg(short = 'l', long, default_value_t = Options::DEFAULT_LOOP_LIMIT)]
    loop_limit: usize,

    /// Also print every rule firing.
    #[arg(long)]
    firings: bool,
}

fn parse_feature(s: &str) -> Result<(u8, i32), String> {
    let (id, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected `ID=VALUE`, got `{s}`"))?;
    let id = id
        .trim()
        .parse::<u8>()
        .map_err(|err| format!("invalid feature ID `{id}`: {err}"))?;
    let value = value
        .trim()
        .parse::<i32>()
        .map_err(|err| format!("invalid feature value `{value}`: {err}"))?;
    Ok((id, value))
}

impl Run {
    fn run(&self, mut options: Options) -> Result<(), String> {
        options.loop_limit = self.loop_limit;
        let mut input = read_input(&self.input)?;
        let compiled = compile(&mut input, &options)?;
        let mut engine =
            gdl::engine::Engine::new(&compiled, &input.font).with_loop_limit(options.loop_limit);
        for (id, value) in &self.features {
            engine = engine.with_feature(*id, *value);
        }
        let glyphs: Vec<Glyph> = self.glyphs.iter().copied().map(Glyph).collect();
        let output = engine.run(&glyphs).map_err(|err| err.to_string())?;
        let ids: Vec<String> = output.glyphs().iter().map(|g| g.0.to_string()).collect();
        println!("{}", ids.join(" "));
        if self.firings {
            for firing in &output.firings {
                println!(
                    "pass {} rule {} at {}",
                    firing.pass, firing.rule, firing.position
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_metadata() {
        let command = Cli::command();
        command.clone().debug_assert();
        assert_eq!(command.get_name(), "gdltools");
        assert_eq!(command.get_author(), Some("The gdltools authors"));
    }
}
