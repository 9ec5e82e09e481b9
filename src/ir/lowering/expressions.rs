use tracing::{debug, instrument};

use crate::{
    ast::{NodeKind, Span, SyntaxNode},
    ir::{CastOp, ConstValue, FCmpPred, Type, Value},
};

use super::{IRBuilder, Lowered, errors::LoweringError, scope::ScopeIndex, translate};

/// Lowers a node that must produce a value.
#[instrument(level = "debug", skip_all, fields(kind = %node.kind))]
pub(crate) fn lower_expression(
    builder: &mut IRBuilder,
    node: &SyntaxNode,
    scope: ScopeIndex,
) -> Result<Value, LoweringError> {
    let lowered = translate(builder, node, scope)?;
    expect_value(lowered, node)
}

/// Unwraps the value of a lowered node, rejecting statements and void calls.
pub(crate) fn expect_value(lowered: Lowered, node: &SyntaxNode) -> Result<Value, LoweringError> {
    match lowered {
        Lowered::Value(value) => Ok(value),
        Lowered::Unit | Lowered::Function(_) => Err(LoweringError::TypeMismatch {
            span: node.span,
            expected: "a value".to_string(),
            found: Type::Void.to_string(),
            context: "expression",
        }),
    }
}

pub(crate) fn lower_literal(node: &SyntaxNode) -> Result<Value, LoweringError> {
    let text = node.text();
    let value = match node.kind {
        NodeKind::Int => ConstValue::I32(parse_c_int(text)),
        NodeKind::Float => ConstValue::F32(parse_c_float(text)),
        NodeKind::Char => ConstValue::Char(parse_char_literal(text)),
        kind => {
            return Err(LoweringError::structural(
                node.span,
                format!("{kind} is not a literal"),
            ));
        }
    };
    debug!(%value, "literal");
    Ok(Value::constant(value))
}

/// Resolves the storage an identifier names.
pub(crate) fn lower_address(
    builder: &IRBuilder,
    node: &SyntaxNode,
    scope: ScopeIndex,
) -> Result<Value, LoweringError> {
    builder
        .scopes
        .lookup(scope, node.text())
        .cloned()
        .ok_or_else(|| LoweringError::UndefinedIdentifier {
            span: node.span,
            name: node.text().to_string(),
        })
}

/// An identifier in value position reads its storage.
pub(crate) fn lower_identifier(
    builder: &mut IRBuilder,
    node: &SyntaxNode,
    scope: ScopeIndex,
) -> Result<Value, LoweringError> {
    let address = lower_address(builder, node, scope)?;
    builder.build_load(&address)
}

/// Converts between arithmetic types, following the usual C conversions.
pub(crate) fn convert(
    builder: &mut IRBuilder,
    value: Value,
    to: &Type,
    context: &'static str,
    span: Option<Span>,
) -> Result<Value, LoweringError> {
    if value.ty == *to {
        return Ok(value);
    }

    let op = match (&value.ty, to) {
        (Type::Int32, Type::Float32) => CastOp::SiToFp,
        (Type::Char8, Type::Float32) => CastOp::UiToFp,
        (Type::Float32, Type::Int32) => CastOp::FpToSi,
        (Type::Float32, Type::Char8) => CastOp::FpToUi,
        (Type::Char8, Type::Int32) => CastOp::ZExt,
        (Type::Int32, Type::Char8) => CastOp::Trunc,
        _ => {
            return Err(LoweringError::TypeMismatch {
                span,
                expected: to.to_string(),
                found: value.ty.to_string(),
                context,
            });
        }
    };

    builder.build_cast(op, &value, to.clone())
}

/// Turns an arithmetic value into a branch condition by comparing it, as a float, with zero.
pub(crate) fn lower_condition(
    builder: &mut IRBuilder,
    value: Value,
    span: Option<Span>,
) -> Result<Value, LoweringError> {
    let value = match value.ty {
        Type::Int32 => builder.build_cast(CastOp::SiToFp, &value, Type::Float32)?,
        Type::Char8 => builder.build_cast(CastOp::UiToFp, &value, Type::Float32)?,
        Type::Float32 => value,
        _ => {
            return Err(LoweringError::TypeMismatch {
                span,
                expected: "an arithmetic type".to_string(),
                found: value.ty.to_string(),
                context: "condition",
            });
        }
    };

    builder.build_fcmp(
        FCmpPred::One,
        &value,
        &Value::constant(ConstValue::F32(0.0)),
    )
}

/// Parses the longest leading integer, like C `atoi`. Overflow wraps.
pub fn parse_c_int(text: &str) -> i32 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i32, |acc, x| {
            acc.wrapping_mul(10).wrapping_add(i32::from(x - b'0'))
        });

    if negative { value.wrapping_neg() } else { value }
}

/// Parses the longest leading decimal float, like C `atof`.
pub fn parse_c_float(text: &str) -> f32 {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'-' | b'+')) {
        end += 1;
    }

    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut mantissa_digits = end - int_start;

    if bytes.get(end) == Some(&b'.') {
        end += 1;
        let frac_start = end;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
        mantissa_digits += end - frac_start;
    }

    if mantissa_digits == 0 {
        let rest = text[int_start..].to_ascii_lowercase();
        let negative = bytes.first() == Some(&b'-');
        let value = if rest.starts_with("inf") {
            f32::INFINITY
        } else if rest.starts_with("nan") {
            f32::NAN
        } else {
            0.0
        };
        return if negative { -value } else { value };
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'-' | b'+')) {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }

    let mut number = text[..end].to_string();
    if number.ends_with('.') {
        number.push('0');
    }
    if let Some(pos) = number.find('.') {
        if !number[..pos].bytes().any(|x| x.is_ascii_digit()) {
            number.insert(pos, '0');
        }
    }
    if let Some(pos) = number.find(['e', 'E']) {
        if number[..pos].ends_with('.') {
            number.insert(pos, '0');
        }
    }

    number.parse().unwrap_or(0.0)
}

/// Reads a `char` leaf like [`parse_c_int`], keeping the low 8 bits. Quoted text such as `'a'`
/// has no leading digits and reads as 0.
pub fn parse_char_literal(text: &str) -> u8 {
    parse_c_int(text) as u8
}
