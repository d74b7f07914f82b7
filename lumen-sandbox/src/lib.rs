//! LUMEN Sandbox - Budgeted Script Execution
//!
//! Runs generated transformation scripts against a dataset and renders the
//! resulting figure as SVG. Scripts are written in a small purpose-built
//! language:
//!
//! ```text
//! counts = df.fillna("Inconnu").count_by("Secteur d'activité")
//! plt.figure(width=12, height=6)
//! plt.bar(counts["Secteur d'activité"], counts["count"])
//! plt.title("Contacts par secteur")
//! ```
//!
//! The global scope holds `df` (read-only) and `plt`. Every lexer, parser
//! and runtime error comes back as a [`SandboxFailure`] value.

pub mod error;
pub mod figure;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod render;

pub use error::{ScriptError, ScriptResult};
pub use figure::Figure;
pub use interpreter::{Interpreter, Value};
pub use parser::parse_program;
pub use render::render_svg;

use lumen_core::{Dataset, RenderedImage, SandboxConfig, SandboxFailure};
use tracing::{debug, warn};

/// Message drawn when a query produced a valid but empty dataset.
pub const NO_DATA_MESSAGE: &str = "Aucune donnée à afficher";

/// Result of one script run. Either part may be absent: a script can fail
/// after drawing nothing, or succeed without plotting.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxRun {
    pub image: Option<RenderedImage>,
    pub error: Option<SandboxFailure>,
    /// Lines written by `print`.
    pub output: Vec<String>,
}

impl SandboxRun {
    pub fn into_parts(self) -> (Option<RenderedImage>, Option<SandboxFailure>) {
        (self.image, self.error)
    }
}

/// Executes scripts under the configured budgets.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run `code` with `dataset` bound to `df`.
    ///
    /// A failed run never yields an image, even if the script plotted
    /// something before the error.
    pub fn run(&self, code: &str, dataset: &Dataset) -> SandboxRun {
        let program = match parse_program(code) {
            Ok(program) => program,
            Err(e) => {
                let error = ScriptError::from(e);
                warn!(error = %error, "Script rejected by parser");
                return SandboxRun {
                    image: None,
                    error: Some(error.into()),
                    output: Vec::new(),
                };
            }
        };

        let mut interpreter = Interpreter::new(dataset.clone(), &self.config);
        let result = interpreter.run(&program);
        let steps = interpreter.steps();
        let (figure, output) = interpreter.into_parts();

        match result {
            Ok(()) => {
                let image = figure
                    .has_content()
                    .then(|| RenderedImage::svg(render_svg(&figure).into_bytes()));
                debug!(
                    steps,
                    statements = program.statements.len(),
                    rendered = image.is_some(),
                    "Script completed"
                );
                SandboxRun {
                    image,
                    error: None,
                    output,
                }
            }
            Err(error) => {
                warn!(error = %error, line = ?error.line(), steps, "Script failed");
                SandboxRun {
                    image: None,
                    error: Some(error.into()),
                    output,
                }
            }
        }
    }

    /// The canned figure shown for an empty result set.
    pub fn no_data_figure(&self) -> RenderedImage {
        let figure = Figure::message(
            self.config.figure_width,
            self.config.figure_height,
            NO_DATA_MESSAGE,
        );
        RenderedImage::svg(render_svg(&figure).into_bytes())
    }
}
