//! Reduces box-tree expressions to normal form against an environment of
//! named definitions.

use std::collections::HashSet;

use thiserror::Error;
use tracing::trace;

use crate::box_tree_impl::box_tree_ast::{
    alpha_conversion, fresh_variable_name, get_all_free_variables, get_all_variables, is_free_in,
    ExprNode,
};
use crate::environment::Environment;

/// When an abstraction `(\x.(f x))` may be collapsed to `f`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EtaPolicy {
    Never,
    Always,
    /// Only when `f` is a name or an abstraction. A stuck partial application
    /// such as `(\x.((g a) x))` keeps its binder.
    FunctionsOnly,
}

/// Knobs for the reduction engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalConfig {
    pub eta_policy: EtaPolicy,
    /// Fail on applications whose head is not a function instead of leaving
    /// them stuck.
    pub strict_application: bool,
    /// Reduce a definition's stored value after looking it up. When false the
    /// value is returned exactly as it was defined.
    pub reduce_definitions: bool,
    /// Ceiling on beta and delta steps for one evaluation.
    pub max_reductions: Option<u64>,
    /// Ceiling on nested evaluation calls. The default fits in the 2 MiB
    /// stack of a spawned thread.
    pub max_depth: Option<usize>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        return EvalConfig {
            eta_policy: EtaPolicy::Always,
            strict_application: false,
            reduce_definitions: true,
            max_reductions: Some(1_000_000),
            max_depth: Some(512),
        };
    }
}

/// Errors that may be raised while reducing a term.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum EvalError {
    #[error("cannot apply `{head}`, it is not a function")]
    ApplyNonFunction { head: String },
    #[error("reduction limit of {limit} steps exceeded")]
    ReductionLimitExceeded { limit: u64 },
    #[error("evaluation depth limit of {limit} exceeded")]
    DepthLimitExceeded { limit: usize },
    #[error("a {form} is not a reducible term")]
    NotAReducibleTerm { form: &'static str },
}

// Substitutes var_value for free occurrences of var_name, renaming binders
// that would capture a free variable of var_value.
fn beta_reduce_helper(
    expr_body: &ExprNode,
    var_name: &str,
    var_value: &ExprNode,
    value_free_vars: &HashSet<&str>,
) -> ExprNode {
    match expr_body {
        ExprNode::Var {
            var_name: curr_var_name,
        } => {
            if curr_var_name == var_name {
                return var_value.clone();
            }
            return expr_body.clone();
        }

        ExprNode::App { func, actual_arg } => {
            return ExprNode::App {
                func: Box::new(beta_reduce_helper(func, var_name, var_value, value_free_vars)),
                actual_arg: Box::new(beta_reduce_helper(
                    actual_arg,
                    var_name,
                    var_value,
                    value_free_vars,
                )),
            };
        }

        ExprNode::Abs {
            formal_param,
            fn_body,
        } => {
            // The binder shadows var_name, nothing below it refers to ours.
            if formal_param == var_name {
                return expr_body.clone();
            }

            if value_free_vars.contains(formal_param.as_str()) {
                let mut vars_to_avoid: HashSet<&str> = get_all_variables(fn_body)
                    .union(value_free_vars)
                    .copied()
                    .collect();
                vars_to_avoid.insert(var_name);
                let new_formal_param = fresh_variable_name(formal_param, &vars_to_avoid);

                let renamed = alpha_conversion(expr_body, formal_param, &new_formal_param);
                trace!("α> {} => {}", expr_body, renamed);

                if let ExprNode::Abs {
                    formal_param,
                    fn_body,
                } = renamed
                {
                    return ExprNode::Abs {
                        formal_param,
                        fn_body: Box::new(beta_reduce_helper(
                            &fn_body,
                            var_name,
                            var_value,
                            value_free_vars,
                        )),
                    };
                }
            }

            return ExprNode::Abs {
                formal_param: formal_param.clone(),
                fn_body: Box::new(beta_reduce_helper(
                    fn_body,
                    var_name,
                    var_value,
                    value_free_vars,
                )),
            };
        }

        ExprNode::Def { .. } | ExprNode::Import { .. } => return expr_body.clone(),
    }
}

/// Capture-avoiding substitution of `var_value` for the free occurrences of
/// `var_name` in `expr_body`. The inputs are left untouched.
pub fn beta_reduce(expr_body: &ExprNode, var_name: &str, var_value: &ExprNode) -> ExprNode {
    let value_free_vars = get_all_free_variables(var_value);
    return beta_reduce_helper(expr_body, var_name, var_value, &value_free_vars);
}

/// Rewrites `(\x.(f x))` to `f` when `x` is not free in `f` and the policy
/// allows it. Anything else is returned unchanged.
pub fn eta_reduction(expr: ExprNode, eta_policy: EtaPolicy) -> ExprNode {
    let is_redex = match &expr {
        ExprNode::Abs {
            formal_param,
            fn_body,
        } => match &**fn_body {
            ExprNode::App { func, actual_arg } => {
                let applies_param = matches!(
                    &**actual_arg,
                    ExprNode::Var { var_name } if var_name == formal_param
                );
                let head_allowed = match eta_policy {
                    EtaPolicy::Never => false,
                    EtaPolicy::Always => true,
                    EtaPolicy::FunctionsOnly => !matches!(&**func, ExprNode::App { .. }),
                };

                applies_param && head_allowed && !is_free_in(formal_param, func)
            }
            _ => false,
        },
        _ => false,
    };

    if !is_redex {
        return expr;
    }

    match expr {
        ExprNode::Abs { fn_body, .. } => match *fn_body {
            ExprNode::App { func, .. } => {
                trace!("η> {}", func);
                return *func;
            }
            fn_body => return fn_body,
        },
        expr => return expr,
    }
}

/// Carries the per-evaluation state: step and depth counters, plus the names
/// bound by the abstractions currently being reduced under.
pub struct Evaluator<'env> {
    env: &'env Environment,
    config: EvalConfig,
    reductions: u64,
    depth: usize,
    bound_names: Vec<String>,
}

impl<'env> Evaluator<'env> {
    pub fn new(env: &'env Environment, config: EvalConfig) -> Self {
        return Evaluator {
            env,
            config,
            reductions: 0,
            depth: 0,
            bound_names: Vec::new(),
        };
    }

    /// Number of beta and delta steps taken so far.
    pub fn reductions(&self) -> u64 {
        return self.reductions;
    }

    /// Reduces `expr` to normal form. Fails if `expr` is a definition or an
    /// import, which the top-level driver must handle itself.
    pub fn eval(&mut self, expr: &ExprNode) -> Result<ExprNode, EvalError> {
        if !expr.is_term() {
            return Err(EvalError::NotAReducibleTerm {
                form: expr.kind_name(),
            });
        }

        return self.eval_expr(expr);
    }

    fn count_reduction(&mut self) -> Result<(), EvalError> {
        self.reductions += 1;

        match self.config.max_reductions {
            Some(limit) if self.reductions > limit => {
                return Err(EvalError::ReductionLimitExceeded { limit });
            }
            _ => return Ok(()),
        }
    }

    fn eval_expr(&mut self, expr: &ExprNode) -> Result<ExprNode, EvalError> {
        if let Some(limit) = self.config.max_depth {
            if self.depth >= limit {
                return Err(EvalError::DepthLimitExceeded { limit });
            }
        }

        self.depth += 1;
        let result = self.eval_expr_inner(expr);
        self.depth -= 1;

        return result;
    }

    fn eval_expr_inner(&mut self, expr: &ExprNode) -> Result<ExprNode, EvalError> {
        match expr {
            ExprNode::Var { var_name } => return self.expand_definition(var_name),

            ExprNode::Abs {
                formal_param,
                fn_body,
            } => {
                let reduced = self.eval_abstraction(formal_param, fn_body)?;
                return Ok(eta_reduction(reduced, self.config.eta_policy));
            }

            ExprNode::App { func, actual_arg } => {
                let func_val = self.eval_expr(func)?;
                let arg_val = self.eval_expr(actual_arg)?;
                return self.apply(func_val, arg_val);
            }

            ExprNode::Def { .. } | ExprNode::Import { .. } => {
                return Err(EvalError::NotAReducibleTerm {
                    form: expr.kind_name(),
                });
            }
        }
    }

    fn eval_under_binder(
        &mut self,
        formal_param: &str,
        fn_body: &ExprNode,
    ) -> Result<ExprNode, EvalError> {
        self.bound_names.push(String::from(formal_param));
        let reduced_body = self.eval_expr(fn_body);
        self.bound_names.pop();

        return reduced_body;
    }

    // Normalizes the body of `(\formal_param. fn_body)`. Definitions expanded
    // in the body refer to global names, so a parameter named like one of
    // their free variables is renamed first and restored afterwards if the
    // normal form no longer mentions the global name.
    fn eval_abstraction(
        &mut self,
        formal_param: &str,
        fn_body: &ExprNode,
    ) -> Result<ExprNode, EvalError> {
        let definition_names = self.definition_free_names(formal_param, fn_body);

        if !definition_names.contains(formal_param) {
            let reduced_body = self.eval_under_binder(formal_param, fn_body)?;
            return Ok(ExprNode::abs(formal_param, reduced_body));
        }

        let new_formal_param = {
            let mut vars_to_avoid = get_all_variables(fn_body);
            vars_to_avoid.extend(definition_names.iter().map(String::as_str));
            vars_to_avoid.extend(self.bound_names.iter().map(String::as_str));
            fresh_variable_name(formal_param, &vars_to_avoid)
        };
        let renamed_body = alpha_conversion(fn_body, formal_param, &new_formal_param);
        trace!("α> {} => {} under {}", formal_param, new_formal_param, renamed_body);

        let reduced_body = self.eval_under_binder(&new_formal_param, &renamed_body)?;
        let reduced = ExprNode::abs(&new_formal_param, reduced_body);

        let needs_fresh_name = get_all_variables(&reduced).contains(formal_param);
        if needs_fresh_name {
            return Ok(reduced);
        }

        return Ok(alpha_conversion(&reduced, &new_formal_param, formal_param));
    }

    // Free variables of every definition that expanding `fn_body` can reach,
    // following definitions that mention other definitions. Names bound
    // around `fn_body` are not expanded and are skipped.
    fn definition_free_names(&self, formal_param: &str, fn_body: &ExprNode) -> HashSet<String> {
        let mut definition_names = HashSet::new();
        if self.env.is_empty() {
            return definition_names;
        }

        let env = self.env;
        let mut visited: HashSet<&str> = HashSet::new();
        let mut pending: Vec<&str> = get_all_free_variables(fn_body)
            .into_iter()
            .filter(|name| *name != formal_param && !self.bound_names.iter().any(|b| b == name))
            .collect();

        while let Some(name) = pending.pop() {
            if !visited.insert(name) {
                continue;
            }
            let Some(def_body) = env.lookup(name) else {
                continue;
            };

            for free_name in get_all_free_variables(def_body) {
                definition_names.insert(String::from(free_name));
                pending.push(free_name);
            }
        }

        return definition_names;
    }

    // Looks a free name up in the environment. Names bound by an enclosing
    // abstraction are never expanded.
    fn expand_definition(&mut self, var_name: &str) -> Result<ExprNode, EvalError> {
        if self.bound_names.iter().any(|bound| bound == var_name) {
            return Ok(ExprNode::var(var_name));
        }

        let env = self.env;
        let Some(def_body) = env.lookup(var_name) else {
            return Ok(ExprNode::var(var_name));
        };

        self.count_reduction()?;
        trace!("δ> {} => {}", var_name, def_body);

        if !self.config.reduce_definitions {
            return Ok(def_body.clone());
        }

        // Definitions live at the top level, so none of our binders are in
        // scope for them.
        let saved_bound_names = std::mem::take(&mut self.bound_names);
        let result = self.eval_expr(def_body);
        self.bound_names = saved_bound_names;

        return result;
    }

    // Applies already-reduced operands. A chain of redexes is followed in a
    // loop so that a diverging term runs into the step limit rather than the
    // depth limit.
    fn apply(
        &mut self,
        mut func_val: ExprNode,
        mut arg_val: ExprNode,
    ) -> Result<ExprNode, EvalError> {
        loop {
            let (formal_param, fn_body) = match func_val {
                ExprNode::Abs {
                    formal_param,
                    fn_body,
                } => (formal_param, fn_body),
                head => return self.stuck_application(head, arg_val),
            };

            self.count_reduction()?;
            let reduced = beta_reduce(&fn_body, &formal_param, &arg_val);
            trace!("β> ({}) [{} := {}] => {}", fn_body, formal_param, arg_val, reduced);

            match reduced {
                ExprNode::App { func, actual_arg } => {
                    func_val = self.eval_expr(&func)?;
                    arg_val = self.eval_expr(&actual_arg)?;
                }
                reduced => return self.eval_expr(&reduced),
            }
        }
    }

    fn stuck_application(&self, head: ExprNode, arg_val: ExprNode) -> Result<ExprNode, EvalError> {
        if self.config.strict_application {
            return Err(EvalError::ApplyNonFunction {
                head: head.to_string(),
            });
        }

        return Ok(ExprNode::app(head, arg_val));
    }
}

/// Reduces a single term to normal form against `env`.
pub fn eval(
    expr: &ExprNode,
    env: &Environment,
    config: &EvalConfig,
) -> Result<ExprNode, EvalError> {
    return Evaluator::new(env, config.clone()).eval(expr);
}

#[cfg(test)]
mod tests {
    use std::iter::zip;

    use crate::{
        box_tree_impl::box_tree_recursive_descent_parsing::{parse_expression, parse_statements},
        lexical_analysis::run_lexical_analysis,
    };

    use super::*;

    fn parse_term(program_str: &str) -> ExprNode {
        let tokens = run_lexical_analysis(program_str, 1).expect("Unable to tokenize term.");
        let mut cursor = 0;
        parse_expression(&tokens, &mut cursor).expect("Unable to parse term.")
    }

    // Runs every line of program_str, binding definitions and evaluating the
    // rest, and returns the results of the evaluations.
    fn run_program(program_str: &str, config: &EvalConfig) -> Vec<Result<String, EvalError>> {
        let tokens = run_lexical_analysis(program_str, 1).expect("Unable to tokenize program.");
        let statements = parse_statements(&tokens).expect("Unable to parse program.");
        let mut env = Environment::new();
        let mut results = Vec::new();

        for statement in statements {
            match statement {
                ExprNode::Def { def_name, def_body } => env.add(&def_name, &def_body),
                term => results.push(eval(&term, &env, config).map(|value| value.to_string())),
            }
        }

        results
    }

    // Executes program_str and verifies that the outputs match
    // expected_str_outputs.
    fn run_execution_test(program_str: &str, expected_str_outputs: &[&str]) {
        let results = run_program(program_str, &EvalConfig::default());
        assert_eq!(results.len(), expected_str_outputs.len());

        zip(expected_str_outputs.iter(), results.iter()).for_each(|(expected, received)| {
            assert_eq!(Ok(String::from(*expected)), *received);
        });
    }

    #[test]
    fn test_beta_reduce_substitutes_free_occurrences() {
        let body = parse_term(r"(x (\x. x))");
        let reduced = beta_reduce(&body, "x", &ExprNode::var("a"));

        assert_eq!(reduced.to_string(), "(a (λx.x))");
    }

    #[test]
    fn test_beta_reduce_avoids_capture() {
        let body = parse_term(r"(\y. x)");
        let reduced = beta_reduce(&body, "x", &ExprNode::var("y"));

        assert_eq!(reduced.to_string(), "(λy_.y)");
        // The input tree is left as it was.
        assert_eq!(body.to_string(), "(λy.x)");
    }

    #[test]
    fn test_beta_reduce_fresh_name_skips_existing() {
        let body = parse_term(r"(\y. (x y_))");
        let reduced = beta_reduce(&body, "x", &ExprNode::var("y"));

        assert_eq!(reduced.to_string(), "(λy__.(y y_))");
    }

    #[test]
    fn test_eta_reduction_policies() {
        let term = parse_term(r"(\x. (f x))");

        assert_eq!(eta_reduction(term.clone(), EtaPolicy::Always), ExprNode::var("f"));
        assert_eq!(eta_reduction(term.clone(), EtaPolicy::Never), term);
        assert_eq!(eta_reduction(term.clone(), EtaPolicy::FunctionsOnly), ExprNode::var("f"));

        let stuck_head = parse_term(r"(\x. ((g a) x))");
        assert_eq!(eta_reduction(stuck_head.clone(), EtaPolicy::FunctionsOnly), stuck_head);

        let bound_head = parse_term(r"(\x. (x x))");
        assert_eq!(eta_reduction(bound_head.clone(), EtaPolicy::Always), bound_head);

        let function_head = parse_term(r"(\x. ((\y. y) x))");
        assert_eq!(
            eta_reduction(function_head, EtaPolicy::FunctionsOnly).to_string(),
            "(λy.y)"
        );
    }

    #[test]
    fn test_eval_simple() {
        run_execution_test(
            r"
                ((\x. x) a)
                ((\x. (\y. x)) y)
                (\x. (f x))
                (a b c)
                ((\x y. y) p q)
            ",
            &["a", "(λy_.y)", "f", "((a b) c)", "q"],
        );
    }

    #[test]
    fn test_alpha_equivalent_identities() {
        run_execution_test(
            r"
                (\x. x)
                (\y. y)
                ((\x. x) (\z. z))
                ((\y. y) (\z. z))
            ",
            &["(λx.x)", "(λy.y)", "(λz.z)", "(λz.z)"],
        );
    }

    #[test]
    fn test_definition_and_reference() {
        run_execution_test("id := (\\x. x)\n(id a)", &["a"]);
    }

    #[test]
    fn test_later_definition_wins() {
        run_execution_test(
            r"
                k := (\x. x)
                (k a)
                k := (\x. b)
                (k a)
            ",
            &["a", "b"],
        );
    }

    #[test]
    fn test_church_addition() {
        run_execution_test(
            r"
                zero := (\f x. x)
                succ := (\n f x. (f (n f x)))
                plus := (\m n f x. (m f (n f x)))
                (plus (succ zero) (succ zero))
                (plus (succ zero) (succ zero) g y)
            ",
            &["(λf.(λx.(f (f x))))", "(g (g y))"],
        );
    }

    #[test]
    fn test_church_booleans() {
        run_execution_test(
            r"
                true := (\t f. t)
                false := (\t f. f)
                not := (\b. (b false true))
                and := (\p q. (p q p))
                (not true yes no)
                (and true (not false) yes no)
            ",
            &["no", "yes"],
        );
    }

    // Abstraction parameters shadow global definitions of the same name.
    #[test]
    fn test_binder_shadows_definition() {
        run_execution_test(
            r"
                id := (\x. x)
                ((\id. (id a)) (\q. b))
                (\id. id)
            ",
            &["b", "(λid.id)"],
        );
    }

    #[test]
    fn test_definitions_reduced_or_kept() {
        let program_str = "id := (\\x. x)\nk := id\n(k a)";

        assert_eq!(run_program(program_str, &EvalConfig::default()), vec![Ok(String::from("a"))]);

        let lazy_config = EvalConfig {
            reduce_definitions: false,
            ..EvalConfig::default()
        };
        assert_eq!(run_program(program_str, &lazy_config), vec![Ok(String::from("(id a)"))]);
    }

    #[test]
    fn test_eta_policies_during_evaluation() {
        let program_str = "(\\f x. (f x))\n(\\x. ((g a) x))";
        let config_for = |eta_policy| EvalConfig {
            eta_policy,
            ..EvalConfig::default()
        };

        assert_eq!(
            run_program(program_str, &config_for(EtaPolicy::Never)),
            vec![
                Ok(String::from("(λf.(λx.(f x)))")),
                Ok(String::from("(λx.((g a) x))"))
            ]
        );
        assert_eq!(
            run_program(program_str, &config_for(EtaPolicy::FunctionsOnly)),
            vec![
                Ok(String::from("(λf.f)")),
                Ok(String::from("(λx.((g a) x))"))
            ]
        );
        assert_eq!(
            run_program(program_str, &config_for(EtaPolicy::Always)),
            vec![Ok(String::from("(λf.f)")), Ok(String::from("(g a)"))]
        );
    }

    // A free name inside a definition stays free when the definition is
    // expanded under a binder of the same name.
    #[test]
    fn test_expanded_definition_is_not_captured() {
        run_execution_test(
            r"
                k := (\x. y)
                (\y. (k a))
                (\y. (y (k a)))
            ",
            &["(λy_.y)", "(λy_.(y_ y))"],
        );
    }

    #[test]
    fn test_unexpanded_definition_is_not_captured() {
        let lazy_config = EvalConfig {
            reduce_definitions: false,
            ..EvalConfig::default()
        };
        let program_str = "y := b\nk := (\\x. y)\n(\\y. (k a))\n(\\y. k)";

        assert_eq!(
            run_program(program_str, &lazy_config),
            vec![Ok(String::from("(λy.b)")), Ok(String::from("(λy_.(λx.y))"))]
        );
        assert_eq!(
            run_program(program_str, &EvalConfig::default()),
            vec![Ok(String::from("(λy.b)")), Ok(String::from("(λy.(λx.b))"))]
        );
    }

    #[test]
    fn test_strict_application() {
        let strict_config = EvalConfig {
            strict_application: true,
            ..EvalConfig::default()
        };

        assert_eq!(
            run_program("(a b)", &strict_config),
            vec![Err(EvalError::ApplyNonFunction {
                head: String::from("a")
            })]
        );
    }

    #[test]
    fn test_self_application_hits_reduction_limit() {
        let bounded_config = EvalConfig {
            max_reductions: Some(1_000),
            ..EvalConfig::default()
        };

        assert_eq!(
            run_program(r"((\x. (x x)) (\x. (x x)))", &bounded_config),
            vec![Err(EvalError::ReductionLimitExceeded { limit: 1_000 })]
        );
    }

    #[test]
    fn test_depth_limit() {
        let shallow_config = EvalConfig {
            max_depth: Some(3),
            ..EvalConfig::default()
        };

        assert_eq!(
            run_program(r"(\a b c d. a)", &shallow_config),
            vec![Err(EvalError::DepthLimitExceeded { limit: 3 })]
        );
    }

    // A nesting far beyond the ceiling fails cleanly instead of exhausting
    // the test thread's stack.
    #[test]
    fn test_default_depth_limit_on_deep_term() {
        let mut body = ExprNode::var("x");
        for _ in 0..4_000 {
            body = ExprNode::app(ExprNode::var("f"), body);
        }
        let term = ExprNode::abs("f", ExprNode::abs("x", body));
        let env = Environment::new();

        assert_eq!(
            eval(&term, &env, &EvalConfig::default()),
            Err(EvalError::DepthLimitExceeded { limit: 512 })
        );
    }

    #[test]
    fn test_statements_are_not_reducible() {
        let env = Environment::new();
        let definition = parse_term(r"id := (\x. x)");

        assert_eq!(
            eval(&definition, &env, &EvalConfig::default()),
            Err(EvalError::NotAReducibleTerm { form: "definition" })
        );
    }

    // Re-evaluating the printed normal form gives the same normal form.
    #[test]
    fn test_normal_forms_are_stable() {
        let env = Environment::new();
        let config = EvalConfig::default();

        for program_str in [
            r"((\x. (\y. x)) y)",
            r"((\n f x. (f (n f x))) (\f x. x))",
            r"(a (\z. (z z)))",
        ] {
            let normal_form = eval(&parse_term(program_str), &env, &config)
                .expect("Unable to evaluate term.");
            let reparsed = parse_term(&normal_form.to_string());
            let again = eval(&reparsed, &env, &config).expect("Unable to re-evaluate term.");

            assert_eq!(normal_form, again);
        }
    }

    #[test]
    fn test_reduction_counter() {
        let env = Environment::new();
        let mut evaluator = Evaluator::new(&env, EvalConfig::default());
        evaluator
            .eval(&parse_term(r"((\x. x) ((\y. y) a))"))
            .expect("Unable to evaluate term.");

        assert_eq!(evaluator.reductions(), 2);
    }
}
