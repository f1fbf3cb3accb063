//! Type resolution
//!
//! Walks the parsed AST post-order, resolves field and lookup references
//! against the field catalog, matches function calls against the registry,
//! and annotates every node with a concrete [`FormulaType`]. A failing
//! subtree is typed `Invalid` and poisons its ancestors silently, so one
//! broken reference reports exactly its own root-cause error instead of a
//! cascade of unrelated ones.

use crate::ast::{BinaryOperator, Expr, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::functions::{CodeGen, FunctionRegistry, ReturnRule, Signature};
use ahash::AHashSet;
use gridbase_core::{FieldCatalog, FieldId, FormulaType, TableId, MAX_DECIMAL_PLACES};
use rust_decimal::Decimal;

/// An AST node annotated with its resolved type
#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpr {
    /// The node itself, with references resolved to ids
    pub kind: TypedExprKind,
    /// The node's resolved type; `Invalid` only inside failed resolutions
    pub ty: FormulaType,
}

/// Typed AST nodes; references carry resolved field ids
#[derive(Debug, Clone, PartialEq)]
pub enum TypedExprKind {
    Number(Decimal),
    String(String),
    Boolean(bool),
    FieldRef(FieldId),
    LookupRef {
        through: FieldId,
        target: FieldId,
    },
    Function {
        name: String,
        codegen: CodeGen,
        args: Vec<TypedExpr>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<TypedExpr>,
        right: Box<TypedExpr>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<TypedExpr>,
    },
    /// Placeholder for a subtree that failed to resolve
    Invalid,
}

/// The output of a successful resolution
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The fully typed AST
    pub typed: TypedExpr,
    /// Every field the formula references, directly or through lookups
    pub dependencies: AHashSet<FieldId>,
}

impl Resolution {
    /// The type of the whole formula
    pub fn resolved_type(&self) -> &FormulaType {
        &self.typed.ty
    }
}

/// Resolve a parsed formula against the catalog and registry
///
/// `table` is the table owning the formula field: `field(...)` names resolve
/// there, `lookup(...)` targets resolve in the linked table.
pub fn resolve(
    expr: &Expr,
    table: TableId,
    catalog: &dyn FieldCatalog,
    registry: &FunctionRegistry,
) -> FormulaResult<Resolution> {
    let mut resolver = Resolver {
        table,
        catalog,
        registry,
        first_error: None,
    };

    let typed = resolver.resolve_node(expr);

    match resolver.first_error {
        Some(error) => Err(error),
        None => Ok(Resolution {
            dependencies: crate::dependency::extract_dependencies(&typed),
            typed,
        }),
    }
}

struct Resolver<'a> {
    table: TableId,
    catalog: &'a dyn FieldCatalog,
    registry: &'a FunctionRegistry,
    first_error: Option<FormulaError>,
}

impl<'a> Resolver<'a> {
    /// Record the first root-cause error; later errors are echoes
    fn fail(&mut self, error: FormulaError) -> TypedExpr {
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
        TypedExpr {
            kind: TypedExprKind::Invalid,
            ty: FormulaType::Invalid,
        }
    }

    fn resolve_node(&mut self, expr: &Expr) -> TypedExpr {
        match expr {
            Expr::Number(n) => TypedExpr {
                kind: TypedExprKind::Number(*n),
                ty: FormulaType::Number {
                    decimal_places: n.scale().min(u32::from(MAX_DECIMAL_PLACES)) as u8,
                },
            },

            Expr::String(s) => TypedExpr {
                kind: TypedExprKind::String(s.clone()),
                ty: FormulaType::Text,
            },

            Expr::Boolean(b) => TypedExpr {
                kind: TypedExprKind::Boolean(*b),
                ty: FormulaType::Boolean,
            },

            Expr::FieldRef(name) => match self.catalog.field_by_name(self.table, name) {
                Some(field) => TypedExpr {
                    kind: TypedExprKind::FieldRef(field.id),
                    ty: field.formula_type.clone(),
                },
                None => self.fail(FormulaError::UnknownFieldReference(name.clone())),
            },

            Expr::LookupRef { through, target } => self.resolve_lookup(through, target),

            Expr::Function { name, args } => self.resolve_function(name, args),

            Expr::BinaryOp { op, left, right } => self.resolve_binary(*op, left, right),

            Expr::UnaryOp { op, operand } => self.resolve_unary(*op, operand),
        }
    }

    fn resolve_lookup(&mut self, through: &str, target: &str) -> TypedExpr {
        let through_field = match self.catalog.field_by_name(self.table, through) {
            Some(field) => field,
            None => return self.fail(FormulaError::UnknownFieldReference(through.to_string())),
        };

        let relation = match &through_field.relation {
            Some(relation) => relation,
            None => {
                return self.fail(FormulaError::ArgumentTypeMismatch {
                    function: "lookup".into(),
                    message: format!("'{through}' is not a link field"),
                })
            }
        };

        let through_id = through_field.id;
        let related_table = relation.related_table;

        let target_field = match self.catalog.field_by_name(related_table, target) {
            Some(field) => field,
            None => return self.fail(FormulaError::UnknownFieldReference(target.to_string())),
        };

        TypedExpr {
            ty: FormulaType::Array(Box::new(target_field.formula_type.clone())),
            kind: TypedExprKind::LookupRef {
                through: through_id,
                target: target_field.id,
            },
        }
    }

    fn resolve_function(&mut self, name: &str, args: &[Expr]) -> TypedExpr {
        let typed_args: Vec<TypedExpr> = args.iter().map(|a| self.resolve_node(a)).collect();

        // A failed argument already reported its root cause
        if typed_args.iter().any(|a| a.ty == FormulaType::Invalid) {
            return TypedExpr {
                kind: TypedExprKind::Invalid,
                ty: FormulaType::Invalid,
            };
        }

        let def = match self.registry.lookup(name) {
            Some(def) => def,
            None => return self.fail(FormulaError::UnknownFunction(name.to_string())),
        };

        let arg_types: Vec<FormulaType> = typed_args.iter().map(|a| a.ty.clone()).collect();

        // Fewest implicit coercions wins; registration order breaks ties
        let mut best: Option<(&Signature, u32)> = None;
        for signature in &def.signatures {
            if let Some(cost) = signature.match_cost(&arg_types) {
                match best {
                    Some((_, best_cost)) if best_cost <= cost => {}
                    _ => best = Some((signature, cost)),
                }
            }
        }

        let signature = match best {
            Some((signature, _)) => signature,
            None => {
                let found = arg_types
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                return self.fail(FormulaError::ArgumentTypeMismatch {
                    function: name.to_string(),
                    message: format!("no overload accepts ({found})"),
                });
            }
        };

        if let Some(validate) = signature.validate {
            if let Err(message) = validate(args) {
                return self.fail(FormulaError::ArgumentTypeMismatch {
                    function: name.to_string(),
                    message,
                });
            }
        }

        let ty = match self.return_type(name, &signature.return_rule, &arg_types) {
            Ok(ty) => ty,
            Err(error) => return self.fail(error),
        };

        TypedExpr {
            kind: TypedExprKind::Function {
                name: name.to_string(),
                codegen: signature.codegen,
                args: typed_args,
            },
            ty,
        }
    }

    fn return_type(
        &self,
        function: &str,
        rule: &ReturnRule,
        arg_types: &[FormulaType],
    ) -> FormulaResult<FormulaType> {
        Ok(match rule {
            ReturnRule::Fixed(ty) => ty.clone(),
            ReturnRule::SameAsArg(i) => arg_types[*i].clone(),
            ReturnRule::ElementOfArg(i) => arg_types[*i].element_type().clone(),
            ReturnRule::WidestNumber => {
                let decimal_places = arg_types
                    .iter()
                    .filter_map(|t| match t {
                        FormulaType::Number { decimal_places } => Some(*decimal_places),
                        _ => None,
                    })
                    .max()
                    .unwrap_or(0);
                FormulaType::Number { decimal_places }
            }
            ReturnRule::CommonType(a, b) => {
                let (ta, tb) = (&arg_types[*a], &arg_types[*b]);
                if ta.coerces_to(tb) {
                    tb.clone()
                } else if tb.coerces_to(ta) {
                    ta.clone()
                } else {
                    return Err(FormulaError::ArgumentTypeMismatch {
                        function: function.to_string(),
                        message: format!("branches have incompatible types {ta} and {tb}"),
                    });
                }
            }
            ReturnRule::Custom(f) => f(arg_types),
        })
    }

    fn resolve_binary(&mut self, op: BinaryOperator, left: &Expr, right: &Expr) -> TypedExpr {
        let left = self.resolve_node(left);
        let right = self.resolve_node(right);

        if left.ty == FormulaType::Invalid || right.ty == FormulaType::Invalid {
            return TypedExpr {
                kind: TypedExprKind::Invalid,
                ty: FormulaType::Invalid,
            };
        }

        let result = match op {
            BinaryOperator::Add => left.ty.add_result(&right.ty),
            BinaryOperator::Subtract => left.ty.sub_result(&right.ty),
            BinaryOperator::Multiply => left.ty.mul_result(&right.ty),
            // Never a resolve-time failure on zero: the compiled expression
            // carries a per-row error value instead
            BinaryOperator::Divide => left.ty.div_result(&right.ty),
            BinaryOperator::Modulo => match (&left.ty, &right.ty) {
                (
                    FormulaType::Number { decimal_places: a },
                    FormulaType::Number { decimal_places: b },
                ) => Some(FormulaType::Number {
                    decimal_places: (*a).max(*b),
                }),
                _ => None,
            },
            BinaryOperator::Power => match (&left.ty, &right.ty) {
                (FormulaType::Number { .. }, FormulaType::Number { .. }) => {
                    Some(FormulaType::Number {
                        decimal_places: MAX_DECIMAL_PLACES,
                    })
                }
                _ => None,
            },
            BinaryOperator::Equal | BinaryOperator::NotEqual => {
                if left.ty.comparable_with(&right.ty) {
                    Some(FormulaType::Boolean)
                } else {
                    None
                }
            }
            BinaryOperator::LessThan
            | BinaryOperator::LessEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterEqual => {
                if left.ty.comparable_with(&right.ty) {
                    Some(FormulaType::Boolean)
                } else {
                    None
                }
            }
            BinaryOperator::And | BinaryOperator::Or => {
                if left.ty.coerces_to(&FormulaType::Boolean)
                    && right.ty.coerces_to(&FormulaType::Boolean)
                {
                    Some(FormulaType::Boolean)
                } else {
                    None
                }
            }
        };

        match result {
            Some(ty) => TypedExpr {
                kind: TypedExprKind::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                ty,
            },
            None => {
                let error = FormulaError::UnsupportedCoercion {
                    op: op.symbol().to_string(),
                    left: left.ty.clone(),
                    right: right.ty.clone(),
                };
                self.fail(error)
            }
        }
    }

    fn resolve_unary(&mut self, op: UnaryOperator, operand: &Expr) -> TypedExpr {
        let operand = self.resolve_node(operand);

        if operand.ty == FormulaType::Invalid {
            return TypedExpr {
                kind: TypedExprKind::Invalid,
                ty: FormulaType::Invalid,
            };
        }

        let result = match op {
            UnaryOperator::Negate => operand.ty.negate_result(),
            UnaryOperator::Not => {
                if operand.ty.coerces_to(&FormulaType::Boolean) {
                    Some(FormulaType::Boolean)
                } else {
                    None
                }
            }
        };

        match result {
            Some(ty) => TypedExpr {
                kind: TypedExprKind::UnaryOp {
                    op,
                    operand: Box::new(operand),
                },
                ty,
            },
            None => {
                let error = FormulaError::ArgumentTypeMismatch {
                    function: op.symbol().to_string(),
                    message: format!("cannot be applied to {}", operand.ty),
                };
                self.fail(error)
            }
        }
    }
}
