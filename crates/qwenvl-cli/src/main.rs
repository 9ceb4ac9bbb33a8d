use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qwenvl_contracts::chat::{parse_intent, CHAT_HELP_COMMANDS};
use qwenvl_contracts::config::NodeConfig;
use qwenvl_contracts::messages::Role;
use qwenvl_contracts::models::{ChatModel, VisionModel};
use qwenvl_contracts::nodes::NodeRegistry;
use qwenvl_engine::{PixelTensor, PromptTranslatorNode, VisualChatNode, VisualQaNode};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "qwenvl", version, about = "Qwen vision and prompt nodes on the command line")]
struct Cli {
    /// Directory holding `config.json` and the `qw/` chat image folder.
    #[arg(long, global = true, default_value = ".")]
    install_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Describe(DescribeArgs),
    Translate(TranslateArgs),
    Chat(ChatArgs),
    Nodes,
}

#[derive(Debug, Parser)]
struct DescribeArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long, default_value = "Describe this image")]
    prompt: String,
    #[arg(long, default_value = "qwen-vl-plus")]
    model: String,
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Debug, Parser)]
struct TranslateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "qwen-turbo")]
    model: String,
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long, default_value = "qwen-vl-plus")]
    model: String,
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("qwenvl error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing();
    match cli.command {
        Command::Describe(args) => run_describe(&cli.install_dir, args),
        Command::Translate(args) => run_translate(&cli.install_dir, args),
        Command::Chat(args) => {
            run_chat(&cli.install_dir, args)?;
            Ok(0)
        }
        Command::Nodes => {
            print!("{}", render_nodes(&NodeRegistry::default()));
            Ok(0)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run_describe(install_dir: &Path, args: DescribeArgs) -> Result<i32> {
    let model: VisionModel = args.model.parse()?;
    let image = load_pixels(&args.image)?;
    let node = VisualQaNode::new(NodeConfig::load(install_dir));
    let text = node
        .generate(Some(&image), &args.prompt, model, args.seed)
        .context("visual question failed")?;
    println!("{text}");
    Ok(0)
}

fn run_translate(install_dir: &Path, args: TranslateArgs) -> Result<i32> {
    let model: ChatModel = args.model.parse()?;
    let node = PromptTranslatorNode::new(NodeConfig::load(install_dir));
    let text = node
        .translate(&args.prompt, model, args.seed)
        .context("prompt translation failed")?;
    println!("{text}");
    Ok(0)
}

fn run_chat(install_dir: &Path, args: ChatArgs) -> Result<()> {
    let active_image = match args.image.as_deref() {
        Some(path) => Some(load_pixels(path)?),
        None => None,
    };
    let mut session = ChatSession {
        node: VisualChatNode::new(NodeConfig::load(install_dir)),
        model: args.model.parse()?,
        seed: args.seed,
        active_image,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    println!("QwenVL chat started. Type /help for commands.");

    loop {
        print!("> ");
        stdout.flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        if session.handle_line(input, &mut stdout)? == ChatStep::Quit {
            break;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatStep {
    Continue,
    Quit,
}

struct ChatSession {
    node: VisualChatNode,
    model: VisionModel,
    seed: u64,
    active_image: Option<PixelTensor>,
}

impl ChatSession {
    fn handle_line(&mut self, input: &str, out: &mut impl Write) -> Result<ChatStep> {
        let intent = parse_intent(input);
        match intent.action.as_str() {
            "noop" => {}
            "help" => {
                writeln!(out, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?;
            }
            "set_model" => match intent.arg_str("model") {
                Some(name) => match name.parse::<VisionModel>() {
                    Ok(parsed) => {
                        self.model = parsed;
                        writeln!(out, "Model set to {}", self.model)?;
                    }
                    Err(err) => writeln!(out, "{err}")?,
                },
                None => writeln!(
                    out,
                    "Model: {} (choices: {})",
                    self.model,
                    VisionModel::names().join(", ")
                )?,
            },
            "set_seed" => match intent.arg_str("seed").map(str::parse::<u64>) {
                Some(Ok(value)) => {
                    self.seed = value;
                    writeln!(out, "Seed set to {}", self.seed)?;
                }
                Some(Err(_)) => writeln!(out, "/seed expects a non-negative integer")?,
                None => writeln!(out, "Seed: {}", self.seed)?,
            },
            "set_image" => match intent.arg_str("path") {
                None => writeln!(out, "/image requires a path")?,
                Some(path) => match load_pixels(Path::new(path)) {
                    Ok(pixels) => {
                        self.active_image = Some(pixels);
                        writeln!(out, "Active image set to {path}")?;
                    }
                    Err(err) => writeln!(out, "Image not loaded: {err:#}")?,
                },
            },
            "history" => {
                let transcript = self.node.transcript();
                if transcript.is_empty() {
                    writeln!(out, "No history yet.")?;
                } else {
                    writeln!(out, "{transcript}")?;
                }
            }
            "reset" => {
                self.node.reset();
                writeln!(out, "Conversation cleared.")?;
            }
            "quit" => return Ok(ChatStep::Quit),
            "prompt" => {
                let prompt = intent.prompt.as_deref().unwrap_or(input);
                match self
                    .node
                    .generate(self.active_image.as_ref(), prompt, self.model, self.seed)
                {
                    Ok(_) => writeln!(out, "{}", last_reply(&self.node))?,
                    Err(err) => writeln!(out, "Chat failed [{}]: {err}", err.error_code())?,
                }
            }
            _ => {
                writeln!(out, "Unknown command: {}", intent.raw.trim())?;
            }
        }
        Ok(ChatStep::Continue)
    }
}

fn last_reply(node: &VisualChatNode) -> String {
    node.history()
        .iter()
        .rev()
        .find(|turn| turn.role == Role::Assistant)
        .map(|turn| turn.text_segments().join("\n"))
        .unwrap_or_default()
}

fn load_pixels(path: &Path) -> Result<PixelTensor> {
    let image = image::open(path)
        .with_context(|| format!("failed to read image {}", path.display()))?
        .to_rgb8();
    Ok(PixelTensor::from_rgb_image(&image))
}

fn render_nodes(registry: &NodeRegistry) -> String {
    let mut out = String::new();
    for node in registry.list() {
        out.push_str(&format!(
            "{}\t{}\t{}\n",
            node.class_name, node.display_name, node.category
        ));
        for input in &node.inputs {
            out.push_str(&format!("  {}: {}\n", input.name, input.type_name()));
        }
    }
    out
}
