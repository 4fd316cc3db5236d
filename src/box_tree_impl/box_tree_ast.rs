//! Data structures to represent lambda calculus expressions, and some utility
//! functions to display and manipulate them.

use std::collections::HashSet;
use std::fmt::Write;

/// Represents a lambda-calculus expression, or one of the two statement forms
/// that may only appear at the top level of a line.
///
/// Every node owns its children outright, so cloning a node deep-copies the
/// whole subtree.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ExprNode {
    Var {
        var_name: String,
    },
    Abs {
        formal_param: String,
        fn_body: Box<ExprNode>,
    },
    App {
        func: Box<ExprNode>,
        actual_arg: Box<ExprNode>,
    },
    Def {
        def_name: String,
        def_body: Box<ExprNode>,
    },
    Import {
        filename: String,
    },
}

impl ExprNode {
    pub fn var(var_name: &str) -> Self {
        return ExprNode::Var {
            var_name: String::from(var_name),
        };
    }

    pub fn abs(formal_param: &str, fn_body: ExprNode) -> Self {
        return ExprNode::Abs {
            formal_param: String::from(formal_param),
            fn_body: Box::new(fn_body),
        };
    }

    pub fn app(func: ExprNode, actual_arg: ExprNode) -> Self {
        return ExprNode::App {
            func: Box::new(func),
            actual_arg: Box::new(actual_arg),
        };
    }

    /// Short name of the node kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExprNode::Var { .. } => "variable",
            ExprNode::Abs { .. } => "abstraction",
            ExprNode::App { .. } => "application",
            ExprNode::Def { .. } => "definition",
            ExprNode::Import { .. } => "import",
        }
    }

    /// True for the forms the reduction engine accepts.
    pub fn is_term(&self) -> bool {
        return matches!(
            self,
            ExprNode::Var { .. } | ExprNode::Abs { .. } | ExprNode::App { .. }
        );
    }
}

// Helper function to produce a string representation of an ExprNode.
fn expr_node_to_string_helper(expr_node: &ExprNode, string_so_far: &mut String) {
    match expr_node {
        ExprNode::Var { var_name } => {
            string_so_far.push_str(var_name.as_str());
        }
        ExprNode::Abs {
            formal_param,
            fn_body,
        } => {
            string_so_far.push_str("(λ");
            string_so_far.push_str(formal_param.as_str());
            string_so_far.push('.');
            expr_node_to_string_helper(fn_body, string_so_far);
            string_so_far.push(')');
        }
        ExprNode::App { func, actual_arg } => {
            string_so_far.push('(');
            expr_node_to_string_helper(func, string_so_far);
            string_so_far.push(' ');
            expr_node_to_string_helper(actual_arg, string_so_far);
            string_so_far.push(')');
        }
        ExprNode::Def { def_name, def_body } => {
            string_so_far.push_str(def_name.as_str());
            string_so_far.push_str(" := ");
            expr_node_to_string_helper(def_body, string_so_far);
        }
        ExprNode::Import { filename } => {
            string_so_far.push_str("#import \"");
            string_so_far.push_str(filename.as_str());
            string_so_far.push('"');
        }
    };
}

/// Converts an expr node to a string using the `(λx.body)` / `(f a)` display
/// grammar. The output can be fed back into the parser.
pub fn expr_node_to_string(expr_node: &ExprNode) -> String {
    let mut out_string = String::new();
    expr_node_to_string_helper(expr_node, &mut out_string);
    return out_string;
}

impl std::fmt::Display for ExprNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "{}", expr_node_to_string(self));
    }
}

fn push_tree_line(out: &mut String, indent: usize, label: &str, value: &str) {
    out.push('|');
    out.push_str(&"-".repeat(indent));
    let _ = writeln!(out, "{label}: {value}");
}

fn expr_node_to_tree_helper(expr_node: &ExprNode, indent: usize, out: &mut String) {
    match expr_node {
        ExprNode::Var { var_name } => push_tree_line(out, indent, "VAR", var_name),
        ExprNode::Abs {
            formal_param,
            fn_body,
        } => {
            push_tree_line(out, indent, "ABS λ", formal_param);
            expr_node_to_tree_helper(fn_body, indent + 2, out);
        }
        ExprNode::App { func, actual_arg } => {
            push_tree_line(out, indent, "APP", "");
            expr_node_to_tree_helper(func, indent + 2, out);
            expr_node_to_tree_helper(actual_arg, indent + 2, out);
        }
        ExprNode::Def { def_name, def_body } => {
            push_tree_line(out, indent, "DEF", def_name);
            expr_node_to_tree_helper(def_body, indent + 2, out);
        }
        ExprNode::Import { filename } => push_tree_line(out, indent, "IMPORT", filename),
    }
}

/// Renders the indented debug dump of a tree, one node per line.
pub fn expr_node_to_tree_string(expr_node: &ExprNode) -> String {
    let mut out = String::new();
    expr_node_to_tree_helper(expr_node, 0, &mut out);
    return out;
}

/// Computes the free variables in the given lambda calculus expression.
pub fn get_all_free_variables(expr_body: &ExprNode) -> HashSet<&str> {
    match expr_body {
        ExprNode::Var { var_name } => HashSet::from([var_name.as_str()]),
        ExprNode::App { func, actual_arg } => {
            let func_free_vars = get_all_free_variables(func);
            let actual_arg_free_vars = get_all_free_variables(actual_arg);

            return func_free_vars
                .union(&actual_arg_free_vars)
                .copied()
                .collect();
        }
        ExprNode::Abs {
            formal_param,
            fn_body,
        } => {
            let mut fn_body_free_vars = get_all_free_variables(fn_body);
            fn_body_free_vars.remove(formal_param.as_str());
            return fn_body_free_vars;
        }
        ExprNode::Def { def_body, .. } => get_all_free_variables(def_body),
        ExprNode::Import { .. } => HashSet::new(),
    }
}

/// Finds all variables used in the given lambda calculus expression, bound or
/// free, including binder names.
pub fn get_all_variables(expr_body: &ExprNode) -> HashSet<&str> {
    match expr_body {
        ExprNode::Var { var_name } => HashSet::from([var_name.as_str()]),
        ExprNode::App { func, actual_arg } => {
            let func_vars = get_all_variables(func);
            let actual_arg_vars = get_all_variables(actual_arg);

            return func_vars.union(&actual_arg_vars).copied().collect();
        }
        ExprNode::Abs {
            formal_param,
            fn_body,
        } => {
            let mut fn_body_vars = get_all_variables(fn_body);
            fn_body_vars.insert(formal_param.as_str());
            return fn_body_vars;
        }
        ExprNode::Def { def_name, def_body } => {
            let mut def_vars = get_all_variables(def_body);
            def_vars.insert(def_name.as_str());
            return def_vars;
        }
        ExprNode::Import { .. } => HashSet::new(),
    }
}

/// True if `name` occurs in `expr` as a variable not shadowed by an enclosing
/// abstraction over the same name.
pub fn is_free_in(name: &str, expr: &ExprNode) -> bool {
    match expr {
        ExprNode::Var { var_name } => var_name == name,
        ExprNode::Abs {
            formal_param,
            fn_body,
        } => formal_param != name && is_free_in(name, fn_body),
        ExprNode::App { func, actual_arg } => {
            is_free_in(name, func) || is_free_in(name, actual_arg)
        }
        ExprNode::Def { def_body, .. } => is_free_in(name, def_body),
        ExprNode::Import { .. } => false,
    }
}

/// Rebuilds `expr` with every occurrence of `old_name` renamed to `new_name`,
/// binders included. Once a binder matches, its whole body is renamed as well.
///
/// Only meaning-preserving when `new_name` does not already occur in `expr`.
pub fn alpha_conversion(expr: &ExprNode, old_name: &str, new_name: &str) -> ExprNode {
    let rename = |name: &String| {
        if name == old_name {
            String::from(new_name)
        } else {
            name.clone()
        }
    };

    match expr {
        ExprNode::Var { var_name } => ExprNode::Var {
            var_name: rename(var_name),
        },
        ExprNode::Abs {
            formal_param,
            fn_body,
        } => ExprNode::Abs {
            formal_param: rename(formal_param),
            fn_body: Box::new(alpha_conversion(fn_body, old_name, new_name)),
        },
        ExprNode::App { func, actual_arg } => ExprNode::App {
            func: Box::new(alpha_conversion(func, old_name, new_name)),
            actual_arg: Box::new(alpha_conversion(actual_arg, old_name, new_name)),
        },
        ExprNode::Def { def_name, def_body } => ExprNode::Def {
            def_name: def_name.clone(),
            def_body: Box::new(alpha_conversion(def_body, old_name, new_name)),
        },
        ExprNode::Import { .. } => expr.clone(),
    }
}

/// Picks a variant of `base_name` (by appending `_`) that is not in
/// `vars_to_avoid`.
pub fn fresh_variable_name(base_name: &str, vars_to_avoid: &HashSet<&str>) -> String {
    let mut new_name = String::from(base_name);

    while vars_to_avoid.contains(new_name.as_str()) {
        new_name.push('_');
    }

    return new_name;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn church_succ() -> ExprNode {
        // (\n. (\f. (\x. (f ((n f) x)))))
        ExprNode::abs(
            "n",
            ExprNode::abs(
                "f",
                ExprNode::abs(
                    "x",
                    ExprNode::app(
                        ExprNode::var("f"),
                        ExprNode::app(
                            ExprNode::app(ExprNode::var("n"), ExprNode::var("f")),
                            ExprNode::var("x"),
                        ),
                    ),
                ),
            ),
        )
    }

    #[test]
    fn test_expr_node_to_string() {
        assert_eq!(church_succ().to_string(), r"(λn.(λf.(λx.(f ((n f) x)))))");

        let definition = ExprNode::Def {
            def_name: String::from("id"),
            def_body: Box::new(ExprNode::abs("x", ExprNode::var("x"))),
        };
        assert_eq!(definition.to_string(), "id := (λx.x)");
    }

    #[test]
    fn test_expr_node_to_tree_string() {
        let expected = "|APP: \n|--ABS λ: x\n|----VAR: x\n|--VAR: a\n";
        let tree = ExprNode::app(ExprNode::abs("x", ExprNode::var("x")), ExprNode::var("a"));

        assert_eq!(expr_node_to_tree_string(&tree), expected);
    }

    #[test]
    fn test_free_variables() {
        // (\x. (x y)) z
        let expr = ExprNode::app(
            ExprNode::abs("x", ExprNode::app(ExprNode::var("x"), ExprNode::var("y"))),
            ExprNode::var("z"),
        );

        assert_eq!(get_all_free_variables(&expr), HashSet::from(["y", "z"]));
        assert_eq!(get_all_variables(&expr), HashSet::from(["x", "y", "z"]));
        assert!(is_free_in("y", &expr));
        assert!(!is_free_in("x", &expr));
        assert!(get_all_free_variables(&church_succ()).is_empty());
    }

    #[test]
    fn test_alpha_conversion_renames_binders_and_bodies() {
        let expr = ExprNode::abs("y", ExprNode::app(ExprNode::var("x"), ExprNode::var("y")));
        let renamed = alpha_conversion(&expr, "y", "y_");

        assert_eq!(
            renamed,
            ExprNode::abs("y_", ExprNode::app(ExprNode::var("x"), ExprNode::var("y_")))
        );
        // The original tree is untouched.
        assert_eq!(expr.to_string(), "(λy.(x y))");
    }

    #[test]
    fn test_fresh_variable_name() {
        assert_eq!(fresh_variable_name("y", &HashSet::from(["x"])), "y");
        assert_eq!(fresh_variable_name("y", &HashSet::from(["y", "y_"])), "y__");
    }
}
