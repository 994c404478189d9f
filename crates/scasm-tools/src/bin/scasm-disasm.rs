// crates/scasm-tools/src/bin/scasm-disasm.rs
//! Désassembleur scasm pour images `.code`.
//!
//! Exemples :
//!   scasm-disasm game.code
//!   scasm-disasm game.code --functions game.functions.json --compact
//!   scasm-disasm game.code --json | jq
//!
//! Sans `--functions`, la table `<stem>.functions.json` voisine est utilisée
//! si elle existe ; sinon les fonctions sont retrouvées par balayage
//! (`ENTER` et cibles de `CALL`).
//!
//! Options utiles :
//!   --emit <f>      : écrit le désassemblage dans un fichier
//!   --json          : imprime une vue JSON structurée
//!   --summary       : résumé (pages, longueur, fonctions)
//!   --verify        : contrôle qu'aucune instruction ne chevauche deux pages

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing::{info, warn};
use yansi::{Color, Paint};

use scasm_disasm::{listing, Disassembler};
use scasm_tools::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "scasm-disasm", version, about = "Désassembleur scasm (pages de code -> texte/JSON)")]
struct Cli {
    /// Image de code (pages concaténées)
    input: PathBuf,

    /// Table des fonctions JSON produite par scasm-asm
    #[arg(short, long)]
    functions: Option<PathBuf>,

    /// Ignore toute table et balaye le code
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "functions")]
    scan: bool,

    /// Écrit le désassemblage dans ce fichier au lieu de stdout
    #[arg(long)]
    emit: Option<PathBuf>,

    /// Vue JSON structurée sur stdout
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Vue compacte (1 ligne par instruction)
    #[arg(long, action = ArgAction::SetTrue)]
    compact: bool,

    /// Résumé rapide sur stderr
    #[arg(long, action = ArgAction::SetTrue)]
    summary: bool,

    /// Vérifie le confinement des instructions dans les pages
    #[arg(long, action = ArgAction::SetTrue)]
    verify: bool,

    /// Affiche la durée de traitement
    #[arg(long, action = ArgAction::SetTrue)]
    time: bool,

    /// Verbosité des traces (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Couleurs: auto|always|never
    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    color: ColorMode,
}

fn main() {
    if let Err(e) = real_main() {
        eprintln!("❌ {e:#}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<()> {
    color_eyre::install().ok();

    let cli = Cli::parse();
    setup_colors(cli.color);
    init_tracing(cli.verbose, cli.color);

    let timer = Timer::start();
    let input = to_utf8(cli.input.clone())?;
    let code = load_code(&input)?;

    let table = match (&cli.functions, cli.scan) {
        (Some(path), _) => Some(to_utf8(path.clone())?),
        (None, false) => Some(sibling_path(&input, None, "functions.json")).filter(|p| p.exists()),
        (None, true) => None,
    };
    let dis = match table {
        Some(path) => {
            info!(table = %path, "function table");
            Disassembler::new(code, load_functions(&path)?)?
        }
        None => {
            warn!("no function table, scanning the code");
            Disassembler::with_scanned_functions(code)?
        }
    };

    if cli.summary {
        print_summary(&dis, &input);
    }

    if cli.verify {
        let count = dis.verify_containment()?;
        eprintln!("{} ({count} instruction(s))", "✓ verify pages OK".paint(Color::Green));
    }

    let functions = dis.disassemble().context("désassemblage")?;
    let txt = if cli.json {
        serde_json::to_string_pretty(&functions)?
    } else if cli.compact {
        listing::compact(&functions)
    } else {
        listing::full(&functions, input.file_name().unwrap_or("code"))
    };

    match &cli.emit {
        Some(path) => {
            let out = to_utf8(path.clone())?;
            write_text(&out, &txt)?;
            eprintln!("📝 Disasm → {out}");
        }
        None => println!("{txt}"),
    }

    if cli.time {
        eprintln!("⏱️  {}", timer.pretty());
    }
    Ok(())
}

fn print_summary(dis: &Disassembler, name: &Utf8Path) {
    let code = dis.code();
    let title = name.file_name().unwrap_or("code");
    eprintln!("{}", format!("== {title} ==").paint(Color::Cyan).bold());
    eprintln!(
        "{} pages={}, length={}, functions={}",
        "•".paint(Color::Blue),
        code.pages().len(),
        code.length(),
        dis.functions().len()
    );
    for f in dis.functions().iter().take(8) {
        eprintln!("   {} [0x{:06X}..0x{:06X}) labels={}", f.name, f.start, f.end, f.labels.len());
    }
}
