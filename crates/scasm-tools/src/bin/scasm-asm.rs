// crates/scasm-tools/src/bin/scasm-asm.rs
//! Assembleur scasm : programme JSON -> pages de code.
//! Usage basique :
//!   scasm-asm game.json
//!   scasm-asm game.json --out-dir target/ --verify --time
//! Sorties (à côté de l'entrée, ou dans --out-dir) :
//!   <stem>.code            : pages concaténées
//!   <stem>.functions.json  : table des fonctions (noms, bornes, labels)
//!   <stem>.tables.json     : chaînes, natives, taille des statiques
//! Flags utiles :
//!   --check        : dry-run, n'écrit rien
//!   --verify       : relit les fichiers écrits et désassemble tout
//!   --disasm       : affiche le désassemblage sur stdout
//!   --embed-names  : nom de fonction dans chaque `ENTER`
//!   --time         : affiche le temps d'assemblage

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing::info;
use yansi::{Color, Paint};

use scasm_disasm::Disassembler;
use scasm_tools::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "scasm-asm", version, about = "Assembleur scasm (programme JSON -> pages de code)")]
struct Cli {
    /// Programme(s) JSON
    inputs: Vec<PathBuf>,

    /// Dossier de sortie (par défaut : celui de chaque entrée)
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// N'écrit rien, vérifie seulement que l'assemblage passe
    #[arg(long, action = ArgAction::SetTrue)]
    check: bool,

    /// Affiche le désassemblage (stdout)
    #[arg(long, action = ArgAction::SetTrue)]
    disasm: bool,

    /// Désassemblage 1 ligne par instruction
    #[arg(long, action = ArgAction::SetTrue)]
    compact: bool,

    /// Relit et désassemble le résultat écrit
    #[arg(long, action = ArgAction::SetTrue)]
    verify: bool,

    /// Force l'insertion des noms de fonctions dans les prologues
    #[arg(long, action = ArgAction::SetTrue)]
    embed_names: bool,

    /// Affiche la durée
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
    info!("{}", version_banner("scasm-asm"));

    if cli.inputs.is_empty() {
        return Err(anyhow!("Aucune entrée. Exemple: scasm-asm game.json --disasm"));
    }
    let out_dir = cli.out_dir.clone().map(to_utf8).transpose()?;

    for input in &cli.inputs {
        let input = to_utf8(input.clone())?;
        process_one(&input, out_dir.as_deref(), &cli).with_context(|| format!("{input}"))?;
    }
    Ok(())
}

fn process_one(input: &Utf8Path, out_dir: Option<&Utf8Path>, cli: &Cli) -> Result<()> {
    let timer = Timer::start();
    let mut program: Program = serde_json::from_str(&read_text(input)?).context("programme JSON invalide")?;
    if cli.embed_names {
        program.options.embed_function_names = true;
    }

    let asm = assemble_program(&program)?;
    info!(pages = asm.pages.len(), length = asm.length, functions = asm.functions.len(), "assembled");

    if cli.disasm {
        let dis = Disassembler::new(asm.code()?, asm.functions.clone())?;
        let title = input.file_name().unwrap_or("program");
        let txt = if cli.compact { disasm_compact(&dis)? } else { disasm_full(&dis, title)? };
        println!("{txt}");
    }

    if !cli.check {
        let code_path = sibling_path(input, out_dir, "code");
        let table_path = sibling_path(input, out_dir, "functions.json");
        let tables_path = sibling_path(input, out_dir, "tables.json");
        write_bytes(&code_path, &asm.raw())?;
        write_json(&table_path, &asm.functions)?;
        write_json(&tables_path, &asm.tables)?;
        eprintln!("✅ Assemblé → {code_path}");
        eprintln!("🧾 Fonctions → {table_path}");

        if cli.verify {
            verify(&code_path, &table_path, &asm)?;
        }
    } else if cli.verify {
        let dis = Disassembler::new(asm.code()?, asm.functions.clone())?;
        dis.verify_containment()?;
        dis.disassemble()?;
        eprintln!("{}", "✓ verify OK (en mémoire)".paint(Color::Green));
    }

    if cli.time {
        eprintln!("⏱️  {}", timer.pretty());
    }
    Ok(())
}

fn verify(code_path: &Utf8Path, table_path: &Utf8Path, asm: &Assembly) -> Result<()> {
    let code = load_code(code_path)?;
    if code.length() != asm.length {
        return Err(anyhow!("longueur relue {} != {}", code.length(), asm.length));
    }
    let dis = Disassembler::new(code, load_functions(table_path)?)?;
    let count = dis.verify_containment()?;
    let functions = dis.disassemble()?;
    eprintln!(
        "{} ({count} instruction(s), {} fonction(s))",
        "✓ verify round-trip OK".paint(Color::Green),
        functions.len()
    );
    Ok(())
}
