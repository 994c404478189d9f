//! scasm-tools: Bibliothèque commune pour les outils CLI scasm.
//!
//! Objectifs : mutualiser I/O, chrono, couleurs, traces, programme JSON et listings.
//!
//! ## Modules & zones clés
//! - `prelude` : import rapide des types/fns usuels
//! - I/O       : `read_text`, `read_bytes`, `write_text`, `write_bytes`, `write_json`
//! - Time      : `Timer`, `human_millis`
//! - Couleurs  : `ColorMode`, `setup_colors`
//! - Traces    : `init_tracing` (filtre `SCASM_LOG`)
//! - Programme : `Program`, `assemble_program` (entrée de `scasm-asm`)
//! - Disasm    : `disasm_full`, `disasm_compact` (to `String`)
//!
//! Les fonctions sont pensées "no surprises" et avec `anyhow::Result`.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![cfg_attr(not(debug_assertions), warn(missing_docs))]

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use scasm_core::{FunctionInfo, PagedCode};
use scasm_disasm::{listing, Disassembler};

pub mod program;

pub use program::{assemble_program, Assembly, Program, Tables};

/// Version lisible du crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Variable d'environnement lue par [`init_tracing`].
pub const LOG_ENV: &str = "SCASM_LOG";

/// Petite bannière de version utile pour logs/outils.
pub fn version_banner(tool: &str) -> String {
    format!("{tool} (scasm-tools {VERSION})")
}

/* ------------------------------------------------------------------------- */
/* Prelude                                                                   */
/* ------------------------------------------------------------------------- */

/// Prelude pratique pour les bins: re-exports compacts.
pub mod prelude {
    pub use anyhow::{anyhow, Context, Result};
    pub use camino::{Utf8Path, Utf8PathBuf};
    pub use std::path::PathBuf;
    pub use crate::{
        version_banner, human_millis, init_tracing,
        read_text, read_bytes, write_text, write_bytes, write_json,
        to_utf8, sibling_path,
        ColorMode, setup_colors, Timer,
        disasm_full, disasm_compact, load_code, load_functions,
        assemble_program, Assembly, Program, Tables,
    };
}

/* ------------------------------------------------------------------------- */
/* I/O utils                                                                 */
/* ------------------------------------------------------------------------- */

/// Lis un fichier texte en UTF-8.
pub fn read_text(path: &Utf8Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("lecture {path}"))
}

/// Lis un fichier binaire.
pub fn read_bytes(path: &Utf8Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("lecture {path}"))
}

/// Écrit un texte (UTF-8). Crée les dossiers au besoin.
pub fn write_text(path: &Utf8Path, s: &str) -> Result<()> { write_bytes(path, s.as_bytes()) }

/// Écrit des bytes. Crée les dossiers au besoin.
pub fn write_bytes(path: &Utf8Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("création {parent}"))?;
    }
    let mut f = fs::File::create(path).with_context(|| format!("écriture {path}"))?;
    f.write_all(bytes)?;
    Ok(())
}

/// Écrit `value` en JSON indenté.
pub fn write_json<T: Serialize + ?Sized>(path: &Utf8Path, value: &T) -> Result<()> {
    let mut s = serde_json::to_string_pretty(value)?;
    s.push('\n');
    write_text(path, &s)
}

/// Convertit un `PathBuf` en `Utf8PathBuf` (erreur si non UTF-8).
pub fn to_utf8(p: PathBuf) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(p).map_err(|_| anyhow!("chemin non UTF-8"))
}

/// `dir/<stem>.<suffix>`, `dir` valant le dossier de `input` par défaut.
pub fn sibling_path(input: &Utf8Path, dir: Option<&Utf8Path>, suffix: &str) -> Utf8PathBuf {
    let stem = input.file_stem().unwrap_or("out");
    let dir = dir.or_else(|| input.parent()).unwrap_or_else(|| Utf8Path::new(""));
    dir.join(format!("{stem}.{suffix}"))
}

/* ------------------------------------------------------------------------- */
/* Time / chrono                                                             */
/* ------------------------------------------------------------------------- */

/// Chrono de scope simple; loggable ensuite.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Démarre un chrono.
    pub fn start() -> Self { Self { start: Instant::now() } }
    /// Durée écoulée.
    pub fn elapsed(&self) -> Duration { self.start.elapsed() }
    /// Format humain court.
    pub fn pretty(&self) -> String { human_millis(self.elapsed()) }
}

/// Format "humain" d'une durée.
pub fn human_millis(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1_000 {
        return format!("{ms} ms");
    }
    let s = ms as f64 / 1000.0;
    if s < 60.0 {
        return format!("{s:.3} s");
    }
    let m = (s / 60.0).floor();
    let rest = s - m * 60.0;
    format!("{m:.0} min {rest:.1} s")
}

/* ------------------------------------------------------------------------- */
/* Couleurs & traces                                                         */
/* ------------------------------------------------------------------------- */

/// Contrôle l'application de couleurs ANSI dans les sorties CLI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ColorMode {
    /// Couleurs seulement si la sortie supporte ANSI.
    #[default]
    Auto,
    /// Force l'activation des couleurs.
    Always,
    /// Désactive complètement les couleurs.
    Never,
}

/// Configure le mode couleur global de yansi.
pub fn setup_colors(mode: ColorMode) {
    match mode {
        ColorMode::Auto => yansi::whenever(yansi::Condition::DEFAULT),
        ColorMode::Always => yansi::enable(),
        ColorMode::Never => yansi::disable(),
    }
}

/// Installe le subscriber `tracing` sur stderr.
///
/// `SCASM_LOG` prime ; sinon `warn`, `debug` avec `-v`, `trace` avec `-vv`.
/// Un second appel est sans effet.
pub fn init_tracing(verbose: u8, color: ColorMode) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(color != ColorMode::Never)
        .with_target(false)
        .try_init();
}

/* ------------------------------------------------------------------------- */
/* Code & disasm helpers                                                     */
/* ------------------------------------------------------------------------- */

/// Charge une image de code brute (pages concaténées).
pub fn load_code(path: &Utf8Path) -> Result<PagedCode> {
    let bytes = read_bytes(path)?;
    PagedCode::from_raw(&bytes).with_context(|| format!("image de code {path}"))
}

/// Charge une table de fonctions JSON.
pub fn load_functions(path: &Utf8Path) -> Result<Vec<FunctionInfo>> {
    let text = read_text(path)?;
    serde_json::from_str(&text).with_context(|| format!("table de fonctions {path}"))
}

/// Désassemble en texte long (lisible).
pub fn disasm_full(dis: &Disassembler, title: &str) -> Result<String> {
    Ok(listing::full(&dis.disassemble()?, title))
}

/// Désassemble en vue compacte (1 ligne / instruction).
pub fn disasm_compact(dis: &Disassembler) -> Result<String> { Ok(listing::compact(&dis.disassemble()?)) }

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utf8(dir: &tempfile::TempDir) -> Utf8PathBuf { to_utf8(dir.path().to_path_buf()).unwrap() }

    #[test]
    fn durations_read_like_humans() {
        assert_eq!(human_millis(Duration::from_millis(12)), "12 ms");
        assert_eq!(human_millis(Duration::from_millis(1_500)), "1.500 s");
        assert_eq!(human_millis(Duration::from_secs(90)), "1 min 30.0 s");
    }

    #[test]
    fn output_paths() {
        let input = Utf8Path::new("src/game.json");
        assert_eq!(sibling_path(input, None, "functions.json"), Utf8PathBuf::from("src/game.functions.json"));
        assert_eq!(
            sibling_path(input, Some(Utf8Path::new("out")), "code"),
            Utf8PathBuf::from("out/game.code")
        );
        assert_eq!(sibling_path(Utf8Path::new("game.json"), None, "code"), Utf8PathBuf::from("game.code"));
    }

    #[test]
    fn assembled_files_load_back() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = utf8(&tmp);
        let program: Program = serde_json::from_str(
            r#"{ "functions": [
                { "name": "main", "body": [{ "op": "CALL", "args": ["f"] }] },
                { "name": "f" }
            ] }"#,
        )?;
        let asm = assemble_program(&program)?;

        let code_path = root.join("nested/unit.code");
        let table_path = root.join("nested/unit.functions.json");
        write_bytes(&code_path, &asm.raw())?;
        write_json(&table_path, &asm.functions)?;

        let code = load_code(&code_path)?;
        assert_eq!(code.length(), asm.length);
        let functions = load_functions(&table_path)?;
        assert_eq!(functions, asm.functions);

        let dis = Disassembler::new(code, functions)?;
        let text = disasm_compact(&dis)?;
        assert!(text.starts_with("0x000000: ENTER 0, 2\n"));
        assert!(text.contains("CALL f"));
        assert!(disasm_full(&dis, "unit.code")?.starts_with("== unit.code == (functions=2,"));
        Ok(())
    }

    #[test]
    fn missing_files_name_the_path() {
        let err = read_bytes(Utf8Path::new("/nonexistent/scasm.code")).unwrap_err();
        assert_eq!(err.to_string(), "lecture /nonexistent/scasm.code");
    }
}
