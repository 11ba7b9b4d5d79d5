use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use rustpython_parser::Parse;
use rustpython_parser::ast::{self, Expr, Stmt};
use serde_json::Map;

use super::builtins::{self, Kwargs};
use super::modules::{self, ModuleState};
use super::value::{
    MAX_VALUE_SIZE, Value, binary_op, check_size, compare, dict_get, dict_set,
};
use super::{
    CodeExecutor, ExecutionError, ExecutionErrorKind, ExecutionOutcome,
    Observation,
};
use crate::prompt::{AuthorizedImports, BASE_BUILTIN_MODULES};
use crate::tool::Toolkit;

/// The number of statements and loop iterations one code blob may run.
pub const MAX_OPERATIONS: usize = 1_000_000;

/// Executes a restricted subset of Python, with the registered tools
/// exposed as functions.
///
/// Variables, imports and the state of the `random` module persist across
/// calls to [`CodeExecutor::execute`].
pub struct LocalPythonExecutor {
    imports: AuthorizedImports,
    globals: HashMap<String, Value>,
    modules: ModuleState,
}

impl LocalPythonExecutor {
    /// Creates an executor that allows exactly `imports`.
    #[inline]
    pub fn new(imports: AuthorizedImports) -> Self {
        Self {
            imports,
            globals: HashMap::new(),
            modules: ModuleState::default(),
        }
    }

    /// Creates an executor that allows the base modules plus `additional`.
    pub fn with_additional_imports<I, S>(additional: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(AuthorizedImports::new(
            BASE_BUILTIN_MODULES.iter().copied(),
            additional,
        ))
    }

    /// Returns the modules the code may import.
    #[inline]
    pub fn authorized_imports(&self) -> &AuthorizedImports {
        &self.imports
    }

    /// Returns the value of a global variable.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }
}

#[async_trait]
impl CodeExecutor for LocalPythonExecutor {
    async fn execute(
        &mut self,
        code: &str,
        toolkit: &Toolkit,
    ) -> ExecutionOutcome {
        let suite = match ast::Suite::parse(code, "<code>") {
            Ok(suite) => suite,
            Err(err) => {
                debug!("code doesn't parse: {err}");
                return ExecutionOutcome::Failed(ExecutionError::syntax(
                    err.to_string(),
                ));
            }
        };
        trace!("executing {} statements", suite.len());

        let mut run = Run {
            globals: &mut self.globals,
            imports: &self.imports,
            modules: &mut self.modules,
            toolkit,
            logs: String::new(),
            operations: 0,
            last: None,
        };
        let result = run.exec_block(&suite).await;
        let Run { logs, last, .. } = run;
        match result {
            Ok(()) => ExecutionOutcome::Continue(Observation {
                logs,
                output: last.unwrap_or(Value::None).to_string(),
            }),
            Err(Interrupt::Terminate(answer)) => {
                ExecutionOutcome::Terminate {
                    answer: answer.to_string(),
                    logs,
                }
            }
            Err(Interrupt::Error(err)) => {
                debug!("execution failed: {err}");
                ExecutionOutcome::Failed(err)
            }
            Err(Interrupt::Break | Interrupt::Continue) => {
                ExecutionOutcome::Failed(ExecutionError::syntax(
                    "'break' or 'continue' outside loop",
                ))
            }
        }
    }
}

enum Interrupt {
    Break,
    Continue,
    Terminate(Value),
    Error(ExecutionError),
}

impl From<ExecutionError> for Interrupt {
    #[inline]
    fn from(err: ExecutionError) -> Self {
        Interrupt::Error(err)
    }
}

type Eval<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, Interrupt>> + Send + 'a>>;

/// A target of an assignment.
enum Place {
    Name(String),
    Item(Box<Place>, Value),
}

struct Run<'r> {
    globals: &'r mut HashMap<String, Value>,
    imports: &'r AuthorizedImports,
    modules: &'r mut ModuleState,
    toolkit: &'r Toolkit,
    logs: String,
    operations: usize,
    last: Option<Value>,
}

impl Run<'_> {
    fn tick(&mut self) -> Result<(), ExecutionError> {
        self.operations += 1;
        if self.operations > MAX_OPERATIONS {
            return Err(ExecutionError::runtime(format!(
                "reached the maximum of {MAX_OPERATIONS} operations, is there \
                 an infinite loop?"
            )));
        }
        Ok(())
    }

    fn exec_block<'s>(&'s mut self, body: &'s [Stmt]) -> Eval<'s, ()> {
        Box::pin(async move {
            for stmt in body {
                self.exec_stmt(stmt).await?;
            }
            Ok(())
        })
    }

    /// Runs a loop body, returning `false` on `break`.
    async fn exec_loop_body(
        &mut self,
        body: &[Stmt],
    ) -> Result<bool, Interrupt> {
        match self.exec_block(body).await {
            Ok(()) | Err(Interrupt::Continue) => Ok(true),
            Err(Interrupt::Break) => Ok(false),
            Err(interrupt) => Err(interrupt),
        }
    }

    fn exec_stmt<'s>(&'s mut self, stmt: &'s Stmt) -> Eval<'s, ()> {
        Box::pin(async move {
            self.tick()?;
            match stmt {
                Stmt::Expr(ast::StmtExpr { value, .. }) => {
                    let value = self.eval(value).await?;
                    self.last = Some(value);
                }
                Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                    let value = self.eval(value).await?;
                    for target in targets {
                        self.assign(target, value.clone()).await?;
                    }
                }
                Stmt::AnnAssign(ast::StmtAnnAssign {
                    target,
                    value: Some(value),
                    ..
                }) => {
                    let value = self.eval(value).await?;
                    self.assign(target, value).await?;
                }
                Stmt::AnnAssign(_) | Stmt::Pass(_) => {}
                Stmt::AugAssign(ast::StmtAugAssign {
                    target, op, value, ..
                }) => {
                    let place = self.resolve_place(target).await?;
                    let current = self.place_mut(&place)?.clone();
                    let rhs = self.eval(value).await?;
                    let updated = binary_op(*op, &current, &rhs)?;
                    *self.place_mut(&place)? = updated;
                }
                Stmt::If(ast::StmtIf {
                    test, body, orelse, ..
                }) => {
                    if self.eval(test).await?.is_truthy() {
                        self.exec_block(body).await?;
                    } else {
                        self.exec_block(orelse).await?;
                    }
                }
                Stmt::For(ast::StmtFor {
                    target,
                    iter,
                    body,
                    orelse,
                    ..
                }) => {
                    let items = self.eval(iter).await?.iterate()?;
                    let mut completed = true;
                    for item in items {
                        self.tick()?;
                        self.assign(target, item).await?;
                        if !self.exec_loop_body(body).await? {
                            completed = false;
                            break;
                        }
                    }
                    if completed {
                        self.exec_block(orelse).await?;
                    }
                }
                Stmt::While(ast::StmtWhile {
                    test, body, orelse, ..
                }) => {
                    let mut completed = true;
                    while self.eval(test).await?.is_truthy() {
                        self.tick()?;
                        if !self.exec_loop_body(body).await? {
                            completed = false;
                            break;
                        }
                    }
                    if completed {
                        self.exec_block(orelse).await?;
                    }
                }
                Stmt::Break(_) => return Err(Interrupt::Break),
                Stmt::Continue(_) => return Err(Interrupt::Continue),
                Stmt::Assert(ast::StmtAssert { test, msg, .. }) => {
                    if !self.eval(test).await?.is_truthy() {
                        let detail = match msg {
                            Some(msg) => self.eval(msg).await?.to_string(),
                            None => String::new(),
                        };
                        return Err(ExecutionError::runtime(format!(
                            "AssertionError: {detail}"
                        ))
                        .into());
                    }
                }
                Stmt::Import(ast::StmtImport { names, .. }) => {
                    for alias in names {
                        let module = alias.name.as_str();
                        self.check_import(module)?;
                        let (binding, value) = match &alias.asname {
                            Some(asname) => (asname.as_str(), module),
                            None => {
                                let root =
                                    module.split('.').next().unwrap_or(module);
                                (root, root)
                            }
                        };
                        self.globals.insert(
                            binding.to_owned(),
                            Value::Module(value.to_owned()),
                        );
                    }
                }
                Stmt::ImportFrom(ast::StmtImportFrom {
                    module, names, ..
                }) => {
                    let Some(module) = module else {
                        return Err(ExecutionError::unsupported(
                            "relative imports",
                        )
                        .into());
                    };
                    let module = module.as_str();
                    self.check_import(module)?;
                    for alias in names {
                        let name = alias.name.as_str();
                        if name == "*" {
                            return Err(ExecutionError::unsupported(
                                "wildcard imports",
                            )
                            .into());
                        }
                        let value = imported_attribute(module, name)?;
                        let binding =
                            alias.asname.as_ref().map_or(name, |a| a.as_str());
                        self.globals.insert(binding.to_owned(), value);
                    }
                }
                Stmt::FunctionDef(_) | Stmt::AsyncFunctionDef(_) => {
                    return Err(ExecutionError::unsupported(
                        "function definitions, write the code inline instead",
                    )
                    .into());
                }
                Stmt::ClassDef(_) => {
                    return Err(
                        ExecutionError::unsupported("class definitions").into()
                    );
                }
                Stmt::Try(_) => {
                    return Err(
                        ExecutionError::unsupported("try statements").into()
                    );
                }
                Stmt::Return(_) => {
                    return Err(
                        ExecutionError::syntax("'return' outside function")
                            .into(),
                    );
                }
                _ => {
                    return Err(ExecutionError::unsupported(
                        "this kind of statement",
                    )
                    .into());
                }
            }
            Ok(())
        })
    }

    fn check_import(&self, module: &str) -> Result<(), ExecutionError> {
        if self.imports.allows(module) {
            debug!("importing {module}");
            return Ok(());
        }
        Err(ExecutionError::new(
            ExecutionErrorKind::ImportNotAllowed,
            format!(
                "import of {module} is not allowed. Authorized imports are: \
                 {}",
                self.imports.render()
            ),
        ))
    }

    fn assign<'s>(
        &'s mut self,
        target: &'s Expr,
        value: Value,
    ) -> Eval<'s, ()> {
        Box::pin(async move {
            match target {
                Expr::Name(ast::ExprName { id, .. }) => {
                    let name = id.as_str();
                    if self.toolkit.contains(name) {
                        return Err(ExecutionError::runtime(format!(
                            "cannot assign to '{name}', it is the name of a \
                             tool"
                        ))
                        .into());
                    }
                    self.globals.insert(name.to_owned(), value);
                }
                Expr::Tuple(ast::ExprTuple { elts, .. })
                | Expr::List(ast::ExprList { elts, .. }) => {
                    let items = value.iterate()?;
                    if items.len() != elts.len() {
                        return Err(ExecutionError::runtime(format!(
                            "ValueError: expected {} values to unpack, got \
                             {}",
                            elts.len(),
                            items.len()
                        ))
                        .into());
                    }
                    for (elt, item) in elts.iter().zip(items) {
                        self.assign(elt, item).await?;
                    }
                }
                Expr::Subscript(ast::ExprSubscript {
                    value: container,
                    slice,
                    ..
                }) => {
                    let place = self.resolve_place(container).await?;
                    let key = self.eval(slice).await?;
                    set_item(self.place_mut(&place)?, key, value)?;
                }
                _ => {
                    return Err(ExecutionError::unsupported(
                        "assignment to this kind of target",
                    )
                    .into());
                }
            }
            Ok(())
        })
    }

    fn resolve_place<'s>(&'s mut self, expr: &'s Expr) -> Eval<'s, Place> {
        Box::pin(async move {
            match expr {
                Expr::Name(ast::ExprName { id, .. }) => {
                    Ok(Place::Name(id.as_str().to_owned()))
                }
                Expr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                    let parent = self.resolve_place(value).await?;
                    let key = self.eval(slice).await?;
                    Ok(Place::Item(Box::new(parent), key))
                }
                _ => Err(ExecutionError::unsupported(
                    "assignment to this kind of target",
                )
                .into()),
            }
        })
    }

    fn place_mut(
        &mut self,
        place: &Place,
    ) -> Result<&mut Value, ExecutionError> {
        match place {
            Place::Name(name) => self
                .globals
                .get_mut(name)
                .ok_or_else(|| ExecutionError::undefined(name)),
            Place::Item(parent, key) => {
                item_mut(self.place_mut(parent)?, key)
            }
        }
    }

    fn read_place(&self, place: &Place) -> Result<Value, ExecutionError> {
        match place {
            Place::Name(name) => self.lookup(name),
            Place::Item(parent, key) => {
                get_item(&self.read_place(parent)?, key)
            }
        }
    }

    fn eval<'s>(&'s mut self, expr: &'s Expr) -> Eval<'s, Value> {
        Box::pin(async move {
            let value = match expr {
                Expr::Constant(ast::ExprConstant { value, .. }) => {
                    constant(value)?
                }
                Expr::Name(ast::ExprName { id, .. }) => {
                    self.lookup(id.as_str())?
                }
                Expr::BoolOp(ast::ExprBoolOp { op, values, .. }) => {
                    let mut result =
                        Value::Bool(matches!(op, ast::BoolOp::And));
                    for value in values {
                        result = self.eval(value).await?;
                        let truthy = result.is_truthy();
                        match op {
                            ast::BoolOp::And if !truthy => break,
                            ast::BoolOp::Or if truthy => break,
                            _ => {}
                        }
                    }
                    result
                }
                Expr::BinOp(ast::ExprBinOp {
                    left, op, right, ..
                }) => {
                    let left = self.eval(left).await?;
                    let right = self.eval(right).await?;
                    binary_op(*op, &left, &right)?
                }
                Expr::UnaryOp(ast::ExprUnaryOp { op, operand, .. }) => {
                    let operand = self.eval(operand).await?;
                    unary_op(*op, &operand)?
                }
                Expr::Compare(ast::ExprCompare {
                    left,
                    ops,
                    comparators,
                    ..
                }) => {
                    let mut left = self.eval(left).await?;
                    for (op, right) in ops.iter().zip(comparators) {
                        let right = self.eval(right).await?;
                        if !compare(*op, &left, &right)? {
                            return Ok(Value::Bool(false));
                        }
                        left = right;
                    }
                    Value::Bool(true)
                }
                Expr::IfExp(ast::ExprIfExp {
                    test, body, orelse, ..
                }) => {
                    if self.eval(test).await?.is_truthy() {
                        self.eval(body).await?
                    } else {
                        self.eval(orelse).await?
                    }
                }
                Expr::List(ast::ExprList { elts, .. }) => {
                    Value::List(self.eval_items(elts).await?)
                }
                Expr::Tuple(ast::ExprTuple { elts, .. }) => {
                    Value::Tuple(self.eval_items(elts).await?)
                }
                Expr::Dict(ast::ExprDict { keys, values, .. }) => {
                    let mut entries = Vec::with_capacity(values.len());
                    for (key, value) in keys.iter().zip(values) {
                        let value = self.eval(value).await?;
                        match key {
                            Some(key) => {
                                let key = self.eval(key).await?;
                                dict_set(&mut entries, key, value);
                            }
                            // `**other`
                            None => match value {
                                Value::Dict(other) => {
                                    for (k, v) in other {
                                        dict_set(&mut entries, k, v);
                                    }
                                }
                                other => {
                                    return Err(not_a_mapping(&other).into());
                                }
                            },
                        }
                    }
                    let dict = Value::Dict(entries);
                    check_size(Some(dict.size()))?;
                    dict
                }
                Expr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                    let container = self.eval(value).await?;
                    match &**slice {
                        Expr::Slice(ast::ExprSlice {
                            lower, upper, step, ..
                        }) => {
                            let lower =
                                self.eval_bound(lower.as_deref()).await?;
                            let upper =
                                self.eval_bound(upper.as_deref()).await?;
                            let step =
                                self.eval_bound(step.as_deref()).await?;
                            get_slice(&container, lower, upper, step)?
                        }
                        key => {
                            let key = self.eval(key).await?;
                            get_item(&container, &key)?
                        }
                    }
                }
                Expr::Attribute(ast::ExprAttribute { value, attr, .. }) => {
                    let value = self.eval(value).await?;
                    attribute(&value, attr.as_str())?
                }
                Expr::Call(ast::ExprCall {
                    func,
                    args,
                    keywords,
                    ..
                }) => self.eval_call(func, args, keywords).await?,
                Expr::JoinedStr(ast::ExprJoinedStr { values, .. }) => {
                    let mut text = String::new();
                    for value in values {
                        text.push_str(&self.eval_formatted(value).await?);
                        check_size(Some(text.len()))?;
                    }
                    Value::Str(text)
                }
                Expr::FormattedValue(_) => {
                    Value::Str(self.eval_formatted(expr).await?)
                }
                Expr::ListComp(ast::ExprListComp { elt, generators, .. })
                | Expr::GeneratorExp(ast::ExprGeneratorExp {
                    elt, generators, ..
                }) => {
                    let (mut items, mut size) = (Vec::new(), 1);
                    self.comprehension(
                        generators, elt, None, &mut items, &mut size,
                    )
                    .await?;
                    Value::List(items)
                }
                Expr::DictComp(ast::ExprDictComp {
                    key,
                    value,
                    generators,
                    ..
                }) => {
                    let (mut pairs, mut size) = (Vec::new(), 1);
                    self.comprehension(
                        generators,
                        key,
                        Some(&**value),
                        &mut pairs,
                        &mut size,
                    )
                    .await?;
                    let mut entries = Vec::with_capacity(pairs.len());
                    for pair in pairs {
                        if let Value::Tuple(mut kv) = pair {
                            let value = kv.pop().unwrap_or(Value::None);
                            let key = kv.pop().unwrap_or(Value::None);
                            dict_set(&mut entries, key, value);
                        }
                    }
                    Value::Dict(entries)
                }
                Expr::Lambda(_) => {
                    return Err(ExecutionError::unsupported(
                        "lambda expressions",
                    )
                    .into());
                }
                Expr::Set(_) | Expr::SetComp(_) => {
                    return Err(ExecutionError::unsupported("sets").into());
                }
                _ => {
                    return Err(ExecutionError::unsupported(
                        "this kind of expression",
                    )
                    .into());
                }
            };
            Ok(value)
        })
    }

    async fn eval_items(
        &mut self,
        elts: &[Expr],
    ) -> Result<Vec<Value>, Interrupt> {
        let mut items = Vec::with_capacity(elts.len());
        let mut size = 1usize;
        for elt in elts {
            let added = match elt {
                Expr::Starred(ast::ExprStarred { value, .. }) => {
                    self.eval(value).await?.iterate()?
                }
                elt => vec![self.eval(elt).await?],
            };
            for item in added {
                size = check_size(size.checked_add(item.size()))?;
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn eval_bound(
        &mut self,
        bound: Option<&Expr>,
    ) -> Result<Option<i64>, Interrupt> {
        let Some(bound) = bound else {
            return Ok(None);
        };
        match self.eval(bound).await? {
            Value::None => Ok(None),
            value => value.as_i64().map(Some).ok_or_else(|| {
                ExecutionError::runtime(
                    "TypeError: slice indices must be integers or None",
                )
                .into()
            }),
        }
    }

    fn eval_formatted<'s>(&'s mut self, expr: &'s Expr) -> Eval<'s, String> {
        Box::pin(async move {
            match expr {
                Expr::Constant(ast::ExprConstant {
                    value: ast::Constant::Str(s),
                    ..
                }) => Ok(s.clone()),
                Expr::FormattedValue(ast::ExprFormattedValue {
                    value,
                    conversion,
                    format_spec,
                    ..
                }) => {
                    let mut value = self.eval(value).await?;
                    if matches!(conversion, ast::ConversionFlag::Repr) {
                        value = Value::Str(value.repr());
                    }
                    let spec = match format_spec {
                        Some(spec) => self.eval(spec).await?.to_string(),
                        None => String::new(),
                    };
                    Ok(builtins::format_value(&value, &spec)?)
                }
                other => Ok(self.eval(other).await?.to_string()),
            }
        })
    }

    /// Evaluates `elt`, or `(elt, value)` pairs, for every combination of
    /// the generators. `size` accounts for everything pushed to `out`.
    fn comprehension<'s>(
        &'s mut self,
        generators: &'s [ast::Comprehension],
        elt: &'s Expr,
        value: Option<&'s Expr>,
        out: &'s mut Vec<Value>,
        size: &'s mut usize,
    ) -> Eval<'s, ()> {
        Box::pin(async move {
            let Some((first, rest)) = generators.split_first() else {
                let key = self.eval(elt).await?;
                let item = match value {
                    Some(value) => {
                        let value = self.eval(value).await?;
                        Value::Tuple(vec![key, value])
                    }
                    None => key,
                };
                *size = check_size(size.checked_add(item.size()))?;
                out.push(item);
                return Ok(());
            };
            let items = self.eval(&first.iter).await?.iterate()?;
            'items: for item in items {
                self.tick()?;
                self.assign(&first.target, item).await?;
                for condition in &first.ifs {
                    if !self.eval(condition).await?.is_truthy() {
                        continue 'items;
                    }
                }
                self.comprehension(rest, elt, value, out, size).await?;
            }
            Ok(())
        })
    }

    fn lookup(&self, name: &str) -> Result<Value, ExecutionError> {
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        if self.toolkit.contains(name) || builtins::is_builtin(name) {
            return Ok(Value::Function(name.to_owned()));
        }
        Err(ExecutionError::undefined(name))
    }

    async fn eval_arguments(
        &mut self,
        args: &[Expr],
        keywords: &[ast::Keyword],
    ) -> Result<(Vec<Value>, Kwargs), Interrupt> {
        let args = self.eval_items(args).await?;
        let mut kwargs = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            let value = self.eval(&keyword.value).await?;
            match &keyword.arg {
                Some(arg) => kwargs.push((arg.as_str().to_owned(), value)),
                None => match value {
                    Value::Dict(entries) => {
                        for (k, v) in entries {
                            let Value::Str(k) = k else {
                                return Err(ExecutionError::runtime(
                                    "TypeError: keywords must be strings",
                                )
                                .into());
                            };
                            kwargs.push((k, v));
                        }
                    }
                    other => return Err(not_a_mapping(&other).into()),
                },
            }
        }
        Ok((args, kwargs))
    }

    async fn eval_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        keywords: &[ast::Keyword],
    ) -> Result<Value, Interrupt> {
        let first_arg = args.first();
        let callee = match func {
            // Methods may mutate their receiver, so it's resolved as a
            // place if possible.
            Expr::Attribute(ast::ExprAttribute { value, attr, .. }) => {
                let method = attr.as_str();
                let mut temporary = Value::None;
                let mut in_place = None;
                match &**value {
                    receiver @ (Expr::Name(_) | Expr::Subscript(_)) => {
                        let place = self.resolve_place(receiver).await?;
                        if self.place_mut(&place).is_ok() {
                            in_place = Some(place);
                        } else {
                            temporary = self.read_place(&place)?;
                        }
                    }
                    receiver => temporary = self.eval(receiver).await?,
                }
                let (args, kwargs) =
                    self.eval_arguments(args, keywords).await?;
                let receiver = match &in_place {
                    Some(place) => self.place_mut(place)?,
                    None => &mut temporary,
                };
                if let Value::Module(module) = receiver {
                    let function = format!("{module}.{method}");
                    let result =
                        self.call_function(&function, args, kwargs).await?;
                    return self
                        .store_in_place(&function, first_arg, result)
                        .await;
                }
                return Ok(builtins::call_method(
                    receiver, method, args, kwargs,
                )?);
            }
            Expr::Name(ast::ExprName { id, .. }) => self.lookup(id.as_str())?,
            other => self.eval(other).await?,
        };
        let Value::Function(name) = callee else {
            return Err(ExecutionError::runtime(format!(
                "TypeError: '{}' object is not callable",
                callee.type_name()
            ))
            .into());
        };
        let (args, kwargs) = self.eval_arguments(args, keywords).await?;
        let result = self.call_function(&name, args, kwargs).await?;
        self.store_in_place(&name, first_arg, result).await
    }

    /// Stores the result of a function that updates its first argument,
    /// as `random.shuffle()` does, back into that argument.
    async fn store_in_place(
        &mut self,
        function: &str,
        first_arg: Option<&Expr>,
        result: Value,
    ) -> Result<Value, Interrupt> {
        if !modules::mutates_first_argument(function) {
            return Ok(result);
        }
        if let Some(target @ (Expr::Name(_) | Expr::Subscript(_))) = first_arg {
            let place = self.resolve_place(target).await?;
            *self.place_mut(&place)? = result;
        }
        Ok(Value::None)
    }

    async fn call_function(
        &mut self,
        name: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value, Interrupt> {
        if let Some((module, function)) = name.split_once('.') {
            if !modules::is_implemented(module) {
                return Err(ExecutionError::unsupported(format!(
                    "module '{module}' is authorized but not available in \
                     this sandbox"
                ))
                .into());
            }
            return Ok(modules::call(
                module,
                function,
                args,
                kwargs,
                self.modules,
            )?);
        }
        if self.toolkit.contains(name) {
            return self.call_tool(name, args, kwargs).await;
        }
        if name == "print" {
            self.print(&args, kwargs)?;
            return Ok(Value::None);
        }
        Ok(builtins::call_builtin(name, args, kwargs)?)
    }

    fn print(
        &mut self,
        args: &[Value],
        kwargs: Kwargs,
    ) -> Result<(), ExecutionError> {
        let mut sep = " ".to_owned();
        let mut end = "\n".to_owned();
        for (key, value) in kwargs {
            let text = match value {
                Value::None => continue,
                Value::Str(text) => text,
                other => {
                    return Err(ExecutionError::runtime(format!(
                        "TypeError: {key} must be None or a string, not {}",
                        other.type_name()
                    )));
                }
            };
            match key.as_str() {
                "sep" => sep = text,
                "end" => end = text,
                _ => {
                    return Err(ExecutionError::runtime(format!(
                        "TypeError: '{key}' is an invalid keyword argument \
                         for print()"
                    )));
                }
            }
        }
        let line = args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(&sep);
        let len = self
            .logs
            .len()
            .checked_add(line.len())
            .and_then(|len| len.checked_add(end.len()));
        if len.is_none_or(|len| len > MAX_VALUE_SIZE) {
            return Err(ExecutionError::runtime(
                "MemoryError: the printed logs are too large for the sandbox",
            ));
        }
        self.logs.push_str(&line);
        self.logs.push_str(&end);
        Ok(())
    }

    async fn call_tool(
        &mut self,
        name: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value, Interrupt> {
        let params = self.toolkit.parameter_names(name);
        if args.len() > params.len() {
            return Err(ExecutionError::new(
                ExecutionErrorKind::Tool,
                format!(
                    "{name}() takes {} positional arguments but {} were given",
                    params.len(),
                    args.len()
                ),
            )
            .into());
        }
        let mut arguments = Map::new();
        for (param, arg) in params.into_iter().zip(args) {
            arguments.insert(param, arg.to_json()?);
        }
        for (key, value) in kwargs {
            if arguments.contains_key(&key) {
                return Err(ExecutionError::new(
                    ExecutionErrorKind::Tool,
                    format!(
                        "{name}() got multiple values for argument '{key}'"
                    ),
                )
                .into());
            }
            arguments.insert(key, value.to_json()?);
        }

        debug!("calling tool {name}");
        let result = self
            .toolkit
            .call(name, serde_json::Value::Object(arguments))
            .await
            .map_err(|err| {
                ExecutionError::new(
                    ExecutionErrorKind::Tool,
                    format!("{name}: {err}"),
                )
            })?;
        let value = Value::from_json(result);
        if self.toolkit.is_terminal(name) {
            return Err(Interrupt::Terminate(value));
        }
        Ok(value)
    }
}

fn constant(value: &ast::Constant) -> Result<Value, ExecutionError> {
    Ok(match value {
        ast::Constant::None => Value::None,
        ast::Constant::Bool(b) => Value::Bool(*b),
        ast::Constant::Str(s) => Value::Str(s.clone()),
        ast::Constant::Int(i) => {
            let i = i.to_string();
            Value::Int(i.parse().map_err(|_| {
                ExecutionError::runtime(format!("integer {i} is too large"))
            })?)
        }
        ast::Constant::Float(f) => Value::Float(*f),
        ast::Constant::Tuple(items) => Value::Tuple(
            items.iter().map(constant).collect::<Result<_, _>>()?,
        ),
        _ => return Err(ExecutionError::unsupported("this kind of literal")),
    })
}

fn not_a_mapping(value: &Value) -> ExecutionError {
    ExecutionError::runtime(format!(
        "TypeError: '{}' object is not a mapping",
        value.type_name()
    ))
}

fn unary_op(
    op: ast::UnaryOp,
    operand: &Value,
) -> Result<Value, ExecutionError> {
    let bad_operand = || {
        ExecutionError::runtime(format!(
            "TypeError: bad operand type for unary operator: '{}'",
            operand.type_name()
        ))
    };
    match op {
        ast::UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        ast::UnaryOp::USub => match operand {
            Value::Float(f) => Ok(Value::Float(-f)),
            other => other
                .as_i64()
                .ok_or_else(bad_operand)?
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| ExecutionError::runtime("integer overflow")),
        },
        ast::UnaryOp::UAdd => match operand {
            Value::Float(f) => Ok(Value::Float(*f)),
            other => other.as_i64().map(Value::Int).ok_or_else(bad_operand),
        },
        ast::UnaryOp::Invert => operand
            .as_i64()
            .map(|i| Value::Int(!i))
            .ok_or_else(bad_operand),
    }
}

fn imported_attribute(
    module: &str,
    name: &str,
) -> Result<Value, ExecutionError> {
    if !modules::is_implemented(module) {
        // Importing is fine, using it is reported when it happens.
        return Ok(Value::Function(format!("{module}.{name}")));
    }
    attribute(&Value::Module(module.to_owned()), name)
}

fn attribute(value: &Value, attr: &str) -> Result<Value, ExecutionError> {
    match value {
        Value::Module(module) => {
            if let Some(constant) = modules::constant(module, attr) {
                return Ok(constant);
            }
            if !modules::is_implemented(module)
                || modules::has_function(module, attr)
            {
                return Ok(Value::Function(format!("{module}.{attr}")));
            }
            Err(ExecutionError::runtime(format!(
                "AttributeError: module '{module}' has no attribute '{attr}'"
            )))
        }
        other => Err(ExecutionError::unsupported(format!(
            "attribute '{attr}' of a '{}' object, only method calls are \
             supported",
            other.type_name()
        ))),
    }
}

fn index(
    idx: &Value,
    len: usize,
    type_name: &str,
) -> Result<usize, ExecutionError> {
    let raw = idx.as_i64().ok_or_else(|| {
        ExecutionError::runtime(format!(
            "TypeError: {type_name} indices must be integers, not '{}'",
            idx.type_name()
        ))
    })?;
    let signed_len = i64::try_from(len).unwrap_or(i64::MAX);
    let normalized = if raw < 0 { raw + signed_len } else { raw };
    if !(0..signed_len).contains(&normalized) {
        return Err(ExecutionError::runtime(format!(
            "IndexError: {type_name} index out of range"
        )));
    }
    Ok(normalized as usize)
}

fn key_error(key: &Value) -> ExecutionError {
    ExecutionError::runtime(format!("KeyError: {}", key.repr()))
}

fn get_item(container: &Value, key: &Value) -> Result<Value, ExecutionError> {
    match container {
        Value::List(items) | Value::Tuple(items) => {
            let idx = index(key, items.len(), container.type_name())?;
            Ok(items[idx].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = index(key, chars.len(), "string")?;
            Ok(Value::Str(chars[idx].to_string()))
        }
        Value::Dict(entries) => {
            dict_get(entries, key).cloned().ok_or_else(|| key_error(key))
        }
        Value::Match(m) => {
            modules::match_method(m, "group", std::slice::from_ref(key))
        }
        other => Err(ExecutionError::runtime(format!(
            "TypeError: '{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn item_mut<'v>(
    container: &'v mut Value,
    key: &Value,
) -> Result<&'v mut Value, ExecutionError> {
    match container {
        Value::List(items) => {
            let idx = index(key, items.len(), "list")?;
            Ok(&mut items[idx])
        }
        Value::Dict(entries) => entries
            .iter_mut()
            .find(|(k, _)| k.py_eq(key))
            .map(|(_, v)| v)
            .ok_or_else(|| key_error(key)),
        other => Err(ExecutionError::runtime(format!(
            "TypeError: '{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn set_item(
    container: &mut Value,
    key: Value,
    value: Value,
) -> Result<(), ExecutionError> {
    match container {
        Value::Dict(entries) => {
            dict_set(entries, key, value);
            Ok(())
        }
        other => {
            *item_mut(other, &key)? = value;
            Ok(())
        }
    }
}

/// Returns the positions selected by a slice, following Python's rules.
fn slice_positions(
    len: usize,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>, ExecutionError> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(ExecutionError::runtime(
            "ValueError: slice step cannot be zero",
        ));
    }
    let adjust = |bound: i64, min: i64, max: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(min, max)
    };
    let mut positions = Vec::new();
    if step > 0 {
        let start = lower.map_or(0, |b| adjust(b, 0, len));
        let stop = upper.map_or(len, |b| adjust(b, 0, len));
        let mut i = start;
        while i < stop {
            positions.push(i as usize);
            i += step;
        }
    } else {
        let start = lower.map_or(len - 1, |b| adjust(b, -1, len - 1));
        let stop = upper.map_or(-1, |b| adjust(b, -1, len - 1));
        let mut i = start;
        while i > stop {
            positions.push(i as usize);
            i += step;
        }
    }
    Ok(positions)
}

fn get_slice(
    container: &Value,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> Result<Value, ExecutionError> {
    match container {
        Value::List(items) | Value::Tuple(items) => {
            let picked = slice_positions(items.len(), lower, upper, step)?
                .into_iter()
                .map(|i| items[i].clone())
                .collect();
            Ok(match container {
                Value::Tuple(_) => Value::Tuple(picked),
                _ => Value::List(picked),
            })
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(
                slice_positions(chars.len(), lower, upper, step)?
                    .into_iter()
                    .map(|i| chars[i])
                    .collect(),
            ))
        }
        other => Err(ExecutionError::runtime(format!(
            "TypeError: '{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;

    use schemars::{JsonSchema, schema_for};
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::tool::{FinishTool, Tool, ToolResult};

    #[derive(Deserialize, JsonSchema)]
    struct WeatherParameters {
        location: String,
        #[serde(default)]
        unit: Option<String>,
    }

    struct WeatherTool {
        schema: serde_json::Value,
    }

    impl WeatherTool {
        fn new() -> Self {
            Self {
                schema: schema_for!(WeatherParameters).to_value(),
            }
        }
    }

    impl Tool for WeatherTool {
        type Input = WeatherParameters;

        fn name(&self) -> &str {
            "get_weather"
        }

        fn description(&self) -> &str {
            "Get the weather."
        }

        fn parameter_schema(&self) -> &serde_json::Value {
            &self.schema
        }

        fn execute(
            &self,
            input: WeatherParameters,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            let unit = input.unit.unwrap_or_else(|| "c".to_owned());
            ready(match input.location.as_str() {
                "Atlantis" => Err(crate::tool::Error::execution_error()
                    .with_reason("unknown location")),
                location => Ok(json!({
                    "location": location,
                    "condition": "sunny",
                    "temperature": if unit == "f" { 68 } else { 20 },
                })),
            })
        }
    }

    fn toolkit() -> Toolkit {
        Toolkit::new()
            .with_tool(WeatherTool::new())
            .with_tool(FinishTool::new())
    }

    async fn run(
        executor: &mut LocalPythonExecutor,
        code: &str,
    ) -> ExecutionOutcome {
        executor.execute(code, &toolkit()).await
    }

    async fn observe(
        executor: &mut LocalPythonExecutor,
        code: &str,
    ) -> Observation {
        match run(executor, code).await {
            ExecutionOutcome::Continue(observation) => observation,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    async fn failure(
        executor: &mut LocalPythonExecutor,
        code: &str,
    ) -> ExecutionError {
        match run(executor, code).await {
            ExecutionOutcome::Failed(err) => err,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    fn executor() -> LocalPythonExecutor {
        LocalPythonExecutor::with_additional_imports(["numpy"])
    }

    #[tokio::test]
    async fn test_print_and_last_output() {
        let mut executor = executor();
        let observation = observe(
            &mut executor,
            "x = 5 + 3\nprint('x is', x)\nprint(f'{x * 2:.1f}', end='!\\n')\nx",
        )
        .await;
        assert_eq!(observation.logs, "x is 8\n16.0!\n");
        assert_eq!(observation.output, "8");

        let observation = observe(&mut executor, "y = 1").await;
        assert_eq!(observation.output, "None");
    }

    #[tokio::test]
    async fn test_state_persists() {
        let mut executor = executor();
        observe(&mut executor, "import math\ncounts = {'a': 1}").await;
        let code = "
counts['b'] = 2
counts['a'] += 10
print(counts, round(math.sqrt(16)))
";
        let observation = observe(&mut executor, code).await;
        assert_eq!(observation.logs, "{'a': 11, 'b': 2} 4\n");
        assert!(executor.get("counts").is_some());
    }

    #[tokio::test]
    async fn test_control_flow() {
        let mut executor = executor();
        let code = "
total = 0
for i in range(10):
    if i % 2 == 0:
        continue
    elif i > 7:
        break
    total += i
n = 0
while n < 3:
    n += 1
else:
    print('done')
a, b = [total, n]
squares = [i * i for i in range(4) if i != 2]
names = {k: len(k) for k in ['ab', 'c']}
print(a, b, squares, names)
";
        let observation = observe(&mut executor, code).await;
        assert_eq!(
            observation.logs,
            "done\n16 3 [0, 1, 9] {'ab': 2, 'c': 1}\n"
        );
    }

    #[tokio::test]
    async fn test_methods_mutate_variables() {
        let mut executor = executor();
        let code = "
items = []
for word in 'b a c'.split():
    items.append(word.upper())
items.sort()
groups = {'x': [1]}
groups['x'].append(2)
print(', '.join(items), groups, items[-1], items[::-1], 'hello'[1:3])
";
        let observation = observe(&mut executor, code).await;
        assert_eq!(
            observation.logs,
            "A, B, C {'x': [1, 2]} C ['C', 'B', 'A'] el\n"
        );
    }

    #[tokio::test]
    async fn test_tool_calls() {
        let mut executor = executor();
        let code = "
w = get_weather('Shanghai')
print(w['condition'], w['temperature'])
get_weather(location='Paris', unit='f')['temperature']
";
        let observation = observe(&mut executor, code).await;
        assert_eq!(observation.logs, "sunny 20\n");
        assert_eq!(observation.output, "68");

        let err = failure(&mut executor, "get_weather('Atlantis')").await;
        assert_eq!(err.kind(), ExecutionErrorKind::Tool);
        assert!(err.detail().contains("unknown location"));

        let err = failure(&mut executor, "get_weather('a', 'c', 'x')").await;
        assert_eq!(err.kind(), ExecutionErrorKind::Tool);
    }

    #[tokio::test]
    async fn test_final_answer_terminates() {
        let mut executor = executor();
        let code = "
print('about to finish')
final_answer('Shanghai is sunny, 20°C')
print('unreachable')
";
        let outcome = run(&mut executor, code).await;
        assert_eq!(
            outcome,
            ExecutionOutcome::Terminate {
                answer: "Shanghai is sunny, 20°C".to_owned(),
                logs: "about to finish\n".to_owned(),
            }
        );

        let outcome = run(&mut executor, "final_answer(answer=[1, 2])").await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Terminate { answer, .. } if answer == "[1, 2]"
        ));
    }

    #[tokio::test]
    async fn test_rejections() {
        let mut executor = executor();

        let err = failure(&mut executor, "import os").await;
        assert_eq!(err.kind(), ExecutionErrorKind::ImportNotAllowed);
        assert!(err.detail().contains("'numpy'"));

        let err = failure(&mut executor, "import datetime").await;
        assert_eq!(err.kind(), ExecutionErrorKind::ImportNotAllowed);

        let err = failure(&mut executor, "print(undefined_thing)").await;
        assert_eq!(err.kind(), ExecutionErrorKind::UndefinedName);

        let err = failure(&mut executor, "final_answer = 3").await;
        assert_eq!(err.kind(), ExecutionErrorKind::Runtime);

        let err = failure(&mut executor, "def f():\n    return 1").await;
        assert_eq!(err.kind(), ExecutionErrorKind::Unsupported);

        let err = failure(&mut executor, "x = (").await;
        assert_eq!(err.kind(), ExecutionErrorKind::Syntax);

        let err = failure(&mut executor, "while True:\n    pass").await;
        assert_eq!(err.kind(), ExecutionErrorKind::Runtime);

        let err = failure(&mut executor, "1 / 0").await;
        assert!(err.to_string().contains("division by zero"));

        // Authorized, but not implemented by the sandbox.
        let err =
            failure(&mut executor, "import numpy as np\nnp.zeros(3)").await;
        assert_eq!(err.kind(), ExecutionErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_oversized_values_fail() {
        let mut executor = executor();
        let cases = [
            "s = 'ab' * (2 ** 62)",
            "l = [1, 2] * (2 ** 62)",
            "x = f'{1:99999999999999999999999}'",
            "s = 'x'\nwhile True:\n    s = s + s",
            "l = [0]\nfor _ in range(64):\n    l = [*l, *l]",
            "s = 'x' * 10000\nl = [s for _ in range(10000)]",
            "s = 'x' * 1000000\nfor _ in range(100):\n    print(s)",
        ];
        for code in cases {
            let err = failure(&mut executor, code).await;
            assert_eq!(err.kind(), ExecutionErrorKind::Runtime, "{code}");
            assert!(err.detail().contains("too large"), "{code}: {err}");
        }
        // The executor is still usable.
        let observation = observe(&mut executor, "len('ab' * 3)").await;
        assert_eq!(observation.output, "6");
    }

    #[tokio::test]
    async fn test_re_module() {
        let mut executor = executor();
        let code = r"
import re
m = re.search(r'(\w+)@(\w+)\.com', 'mail bob@example.com now')
print(m.group(1), m.group(2), m.span(), m[0])
print(re.findall(r'\d+', 'a1b22c333'), re.sub(r'(\d+)', r'<\1>', 'a1b22'))
print(re.match('x', 'abc'), re.split(r'\s*,\s*', 'a , b,c'))
";
        let observation = observe(&mut executor, code).await;
        assert_eq!(
            observation.logs,
            "bob example (5, 20) bob@example.com\n\
             ['1', '22', '333'] a<1>b<22>\n\
             None ['a', 'b', 'c']\n"
        );
    }

    #[tokio::test]
    async fn test_statistics_module() {
        let mut executor = executor();
        let code = "
import statistics as st
data = [2, 4, 4, 4, 5, 5, 7, 9]
print(st.mean(data), st.median(data), st.mode(data), st.pstdev(data))
st.median([1, 3, 2])
";
        let observation = observe(&mut executor, code).await;
        assert_eq!(observation.logs, "5 4.5 4 2.0\n");
        assert_eq!(observation.output, "2");

        let err = failure(&mut executor, "st.mean([])").await;
        assert!(err.detail().contains("StatisticsError"));
    }

    #[tokio::test]
    async fn test_random_module() {
        let mut executor = executor();
        let code = "
import random
from random import shuffle
random.seed(42)
items = [1, 2, 3, 4, 5]
random.shuffle(items)
groups = {'x': [1, 2, 3]}
shuffle(groups['x'])
roll = random.randint(1, 6)
print(sorted(items), sorted(groups['x']), 1 <= roll <= 6)
random.seed(7)
a = [random.random() for _ in range(3)]
random.seed(7)
b = [random.random() for _ in range(3)]
a == b and random.choice(items) in items
";
        let observation = observe(&mut executor, code).await;
        assert_eq!(observation.logs, "[1, 2, 3, 4, 5] [1, 2, 3] True\n");
        assert_eq!(observation.output, "True");
        let shuffled = observe(&mut executor, "random.shuffle(items)").await;
        assert_eq!(shuffled.output, "None");
    }

    #[tokio::test]
    async fn test_collections_and_itertools_modules() {
        let mut executor = executor();
        let code = "
from collections import Counter, deque
from itertools import combinations, groupby, islice, permutations, product
counts = Counter('abracadabra')
print(counts.most_common(2), counts['a'])
q = deque([1, 2])
q.append(3)
q.appendleft(0)
print(q.popleft(), q)
print(list(combinations([1, 2, 3], 2)), list(permutations('ab')))
print(list(islice(range(10), 2, 8, 3)), len(list(product('ab', repeat=3))))
[(k, len(list(g))) for k, g in groupby('aabccc')]
";
        let observation = observe(&mut executor, code).await;
        assert_eq!(
            observation.logs,
            "[('a', 5), ('b', 2)] 5\n\
             0 [1, 2, 3]\n\
             [(1, 2), (1, 3), (2, 3)] [('a', 'b'), ('b', 'a')]\n\
             [2, 5] 8\n"
        );
        assert_eq!(observation.output, "[('a', 2), ('b', 1), ('c', 3)]");

        let err = failure(&mut executor, "import itertools\nitertools.count()")
            .await;
        assert_eq!(err.kind(), ExecutionErrorKind::Runtime);
    }

    #[tokio::test]
    async fn test_time_module() {
        let mut executor = executor();
        let code = "
import time
start = time.perf_counter()
print(time.perf_counter() >= start, time.time() > 1600000000)
";
        let observation = observe(&mut executor, code).await;
        assert_eq!(observation.logs, "True True\n");
    }

    #[tokio::test]
    async fn test_unrestricted_imports() {
        let mut executor = LocalPythonExecutor::new(AuthorizedImports::new(
            ["*"],
            Vec::<String>::new(),
        ));
        observe(&mut executor, "import os.path\nfrom math import pi as PI")
            .await;
        assert!(matches!(
            executor.get("os"),
            Some(Value::Module(m)) if m == "os"
        ));
        assert!(matches!(executor.get("PI"), Some(Value::Float(_))));
    }
}
