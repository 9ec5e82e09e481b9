use crate::ir::lowering::LoweringError;
use ariadne::{ColorGenerator, Label, Report, ReportKind};
use std::ops::Range;

#[derive(Debug, Clone)]
pub struct FileSpan {
    pub span: Range<usize>,
    pub path: String,
}

impl FileSpan {
    pub fn new(path: String, span: Range<usize>) -> Self {
        Self { path, span }
    }
}

impl ariadne::Span for FileSpan {
    type SourceId = String;

    fn source(&self) -> &Self::SourceId {
        &self.path
    }

    fn start(&self) -> usize {
        self.span.start
    }

    fn end(&self) -> usize {
        self.span.end
    }
}

/// Creates a report from a lowering error. Errors found in trees without spans point at the
/// start of `path`.
pub fn lowering_error_to_report(error: &LoweringError, path: &str) -> Report<'static, FileSpan> {
    let mut colors = ColorGenerator::new();
    colors.next();

    let span = error.span().map(Range::from).unwrap_or(0..0);
    let filespan = FileSpan::new(path.to_string(), span);

    let label = match error {
        LoweringError::UnknownType { name, .. } => format!("Type {name:?} is not known."),
        LoweringError::TypeMismatch {
            expected,
            found,
            context,
            ..
        } => format!("Expected {expected} in {context}, found {found}."),
        LoweringError::ArityMismatch {
            function,
            found,
            needs,
            ..
        } => format!("{function:?} takes {needs} arguments, but {found} were given."),
        LoweringError::UndefinedIdentifier { name, .. } => {
            format!("Cannot find {name:?} in this scope.")
        }
        LoweringError::UndefinedFunction { name, .. } => {
            format!("Function {name:?} is not declared.")
        }
        LoweringError::DuplicateDefinition { name, what, .. } => {
            format!("The {what} {name:?} is already defined.")
        }
        LoweringError::SignatureConflict {
            previous, found, ..
        } => format!("Previously declared as {previous}, now as {found}."),
        LoweringError::InvalidLValue { found, .. } => {
            format!("Can't assign to a {found}, only to variables.")
        }
        LoweringError::StructuralPrecondition { message, .. } => message.clone(),
        LoweringError::NonConstantInitializer { .. } => {
            "Globals can only be initialized with a literal.".to_string()
        }
        LoweringError::Verification(error) => error.to_string(),
    };

    Report::build(ReportKind::Error, filespan.clone())
        .with_code(error.code())
        .with_message(error.to_string())
        .with_label(
            Label::new(filespan)
                .with_message(label)
                .with_color(colors.next()),
        )
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    #[test]
    fn report_points_at_the_span() {
        let error = LoweringError::UndefinedIdentifier {
            span: Some(Span::new(4, 7)),
            name: "foo".to_string(),
        };
        let report = lowering_error_to_report(&error, "test.c");

        let mut out = Vec::new();
        let source = "int foo;";
        report
            .write(
                ("test.c".to_string(), ariadne::Source::from(source)),
                &mut out,
            )
            .unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("UndefinedIdentifier"));
    }
}
