//! Diagnostics normalizer.

use trustbridge_model::Diagnostic;
use trustbridge_script::{ScriptDiagnostic, Severity};

/// Map compiler diagnostics onto the wire shape: errors first, then
/// warnings, each keeping its relative order. The location is folded into
/// the description as `(line,col): message`.
pub fn normalize(diagnostics: &[ScriptDiagnostic]) -> Vec<Diagnostic> {
    let errors = diagnostics.iter().filter(|d| d.severity == Severity::Error);
    let warnings = diagnostics.iter().filter(|d| d.severity == Severity::Warning);
    errors.chain(warnings).map(normalize_one).collect()
}

pub fn normalize_one(diagnostic: &ScriptDiagnostic) -> Diagnostic {
    let description = if diagnostic.span.is_known() {
        format!("{}: {}", diagnostic.span, diagnostic.message)
    } else {
        diagnostic.message.clone()
    };
    match diagnostic.severity {
        Severity::Error => Diagnostic::error(diagnostic.code, description),
        Severity::Warning => Diagnostic::warning(diagnostic.code, description),
    }
}
