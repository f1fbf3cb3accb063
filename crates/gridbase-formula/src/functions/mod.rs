//! Built-in formula functions
//!
//! The registry is a static catalog: each function declares its overloads
//! (ordered parameter patterns, return-type rule, code-gen strategy) and is
//! registered once at startup. The registry is read-only afterwards and is
//! passed by reference into the type resolver; it never takes part in a
//! formula's lifecycle.

pub mod aggregate;
pub mod date;
pub mod logical;
pub mod math;
pub mod text;

use crate::ast::Expr;
use ahash::AHashMap;
use gridbase_core::FormulaType;
use once_cell::sync::Lazy;

/// A parameter pattern an argument type is matched against
#[derive(Debug, Clone)]
pub enum ParamType {
    /// Exactly this type (implicit coercions allowed at cost 1)
    Exact(FormulaType),
    /// Any number, regardless of precision
    AnyNumber,
    /// Any textual type (text preferred, long text/url/select coerce)
    AnyText,
    /// Any date, with or without time
    AnyDate,
    /// Anything
    Any,
    /// An array whose element type matches the inner pattern
    ArrayOf(Box<ParamType>),
}

impl ParamType {
    /// Cost of passing an argument of type `ty` to this parameter
    ///
    /// `Some(0)` exact, `Some(1)` via implicit coercion, `None` no match.
    /// The overload with the lowest total cost wins.
    pub fn match_cost(&self, ty: &FormulaType) -> Option<u8> {
        match self {
            ParamType::Exact(target) => ty.coercion_cost(target),
            ParamType::AnyNumber => match ty {
                FormulaType::Number { .. } => Some(0),
                FormulaType::Blank => Some(1),
                _ => None,
            },
            ParamType::AnyText => match ty {
                FormulaType::Text => Some(0),
                FormulaType::LongText
                | FormulaType::Url
                | FormulaType::SingleSelect
                | FormulaType::Blank => Some(1),
                _ => None,
            },
            ParamType::AnyDate => match ty {
                FormulaType::Date { .. } => Some(0),
                FormulaType::Blank => Some(1),
                _ => None,
            },
            ParamType::Any => Some(0),
            ParamType::ArrayOf(inner) => match ty {
                FormulaType::Array(element) => inner.match_cost(element),
                _ => None,
            },
        }
    }
}

/// How an overload's return type is derived from its argument types
#[derive(Debug, Clone)]
pub enum ReturnRule {
    /// Always this type
    Fixed(FormulaType),
    /// Same type as the n-th argument
    SameAsArg(usize),
    /// A number as precise as the widest numeric argument
    WidestNumber,
    /// The element type of the n-th (array) argument
    ElementOfArg(usize),
    /// The common type of two arguments (either coerces to the other)
    CommonType(usize, usize),
    /// Arbitrary rule over the argument types
    Custom(fn(&[FormulaType]) -> FormulaType),
}

/// How an overload emits its target expression
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CodeGen {
    /// Template with `{0}`, `{1}`, ... placeholders for compiled arguments
    Template(&'static str),
    /// SQL aggregate pushed into the lookup subquery of the first argument
    Aggregate {
        /// Aggregate function name (`sum`, `count`, `string_agg`, ...)
        sql_fn: &'static str,
        /// SQL fragment the empty-relation result is coalesced to
        coalesce: Option<&'static str>,
    },
    /// Routine producing the expression from compiled argument fragments
    Custom(fn(&[String]) -> String),
}

/// Resolve-time check over the raw argument expressions
///
/// Used to reject bad literal arguments (malformed regex patterns, invalid
/// date text) while the user is still editing the formula.
pub type Validator = fn(&[Expr]) -> Result<(), String>;

/// One overload of a function
#[derive(Debug, Clone)]
pub struct Signature {
    /// Ordered parameter patterns
    pub params: Vec<ParamType>,
    /// Whether the last parameter accepts additional trailing arguments
    pub variadic: bool,
    /// Return-type rule
    pub return_rule: ReturnRule,
    /// Code-gen strategy
    pub codegen: CodeGen,
    /// Optional literal-argument validation
    pub validate: Option<Validator>,
}

impl Signature {
    /// Signature with fixed arity and no validation
    pub fn new(params: Vec<ParamType>, return_rule: ReturnRule, codegen: CodeGen) -> Self {
        Self {
            params,
            variadic: false,
            return_rule,
            codegen,
            validate: None,
        }
    }

    /// Total coercion cost of calling this overload with the given argument
    /// types, or `None` if they do not fit
    pub fn match_cost(&self, arg_types: &[FormulaType]) -> Option<u32> {
        if self.variadic {
            if arg_types.len() < self.params.len() {
                return None;
            }
        } else if arg_types.len() != self.params.len() {
            return None;
        }

        let mut total: u32 = 0;
        for (i, ty) in arg_types.iter().enumerate() {
            // Trailing arguments of a variadic overload match the last pattern
            let param = if i < self.params.len() {
                &self.params[i]
            } else {
                self.params.last()?
            };
            total += u32::from(param.match_cost(ty)?);
        }
        Some(total)
    }
}

/// Function definition: a name plus its overloads in registration order
#[derive(Debug, Clone)]
pub struct FunctionDef {
    /// Function name (lowercase)
    pub name: &'static str,
    /// Overloads; earlier entries win cost ties
    pub signatures: Vec<Signature>,
}

/// Function registry
#[derive(Debug)]
pub struct FunctionRegistry {
    functions: AHashMap<&'static str, FunctionDef>,
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self {
            functions: AHashMap::new(),
        };

        registry.register_text_functions();
        registry.register_math_functions();
        registry.register_logical_functions();
        registry.register_date_functions();
        registry.register_aggregate_functions();

        registry
    }

    /// Look up a function by name (case-insensitive)
    pub fn lookup(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name.to_ascii_lowercase().as_str())
    }

    /// Register a function
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name, def);
    }

    /// Names of all registered functions
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide registry with all built-in functions
static DEFAULT_REGISTRY: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::new);

/// The process-wide read-only registry
pub fn default_registry() -> &'static FunctionRegistry {
    &DEFAULT_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = FunctionRegistry::new();
        assert!(registry.lookup("SUM").is_some());
        assert!(registry.lookup("sum").is_some());
        assert!(registry.lookup("no_such_function").is_none());
    }

    #[test]
    fn test_not_is_an_operator_not_a_function() {
        // `not(x)` parses as the unary operator, so a registry entry for
        // it could never be reached
        assert!(FunctionRegistry::new().lookup("not").is_none());
    }

    #[test]
    fn test_exact_match_costs_zero() {
        let sig = Signature::new(
            vec![ParamType::Exact(FormulaType::Text)],
            ReturnRule::Fixed(FormulaType::Text),
            CodeGen::Template("upper({0})"),
        );
        assert_eq!(sig.match_cost(&[FormulaType::Text]), Some(0));
        assert_eq!(sig.match_cost(&[FormulaType::Url]), Some(1));
        assert_eq!(sig.match_cost(&[FormulaType::Boolean]), None);
        assert_eq!(sig.match_cost(&[]), None);
    }

    #[test]
    fn test_variadic_matches_trailing_args() {
        let sig = Signature {
            params: vec![ParamType::Any],
            variadic: true,
            return_rule: ReturnRule::Fixed(FormulaType::Text),
            codegen: CodeGen::Custom(|args| format!("concat({})", args.join(", "))),
            validate: None,
        };
        assert_eq!(sig.match_cost(&[FormulaType::Text]), Some(0));
        assert_eq!(
            sig.match_cost(&[FormulaType::Text, FormulaType::Boolean, FormulaType::Url]),
            Some(0)
        );
        assert_eq!(sig.match_cost(&[]), None);
    }

    #[test]
    fn test_array_param_matches_element_type() {
        let param = ParamType::ArrayOf(Box::new(ParamType::AnyNumber));
        let numbers = FormulaType::Array(Box::new(FormulaType::number(2)));
        let texts = FormulaType::Array(Box::new(FormulaType::Text));
        assert_eq!(param.match_cost(&numbers), Some(0));
        assert_eq!(param.match_cost(&texts), None);
        assert_eq!(param.match_cost(&FormulaType::number(2)), None);
    }
}
