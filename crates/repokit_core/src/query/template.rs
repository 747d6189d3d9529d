//! Explicit query templates: a JPQL-like subset rewritten onto tables and
//! columns.
//!
//! Supported shapes:
//! - `select [distinct] <m | m.path, .. | count([distinct] m[.path])> from
//!   <Entity> m [[left|inner] join [fetch] m.<relation> [alias]]* [where ..]
//!   [order by m.path [asc|desc], ..]`
//! - `update <Entity> m set m.field = <expr>, .. [where ..]`
//! - `delete from <Entity> m [where ..]`
//!
//! `:name` placeholders bind by name; positional `?` placeholders are
//! rejected.

use crate::model::entity::EntitySchema;
use crate::model::value::Value;
use crate::query::plan::{
    CountTarget, Join, OrderTerm, PlanKind, ProjectedColumn, Projection, QueryPlan,
};
use crate::query::{Args, Direction};
use crate::repo::error::{RepoError, RepoResult};
use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
          (?P<space>\s+)
        | (?P<param>:[A-Za-z_][A-Za-z0-9_]*)
        | (?P<positional>\?\d*)
        | (?P<string>'(?:[^']|'')*')
        | (?P<number>\d+(?:\.\d+)?)
        | (?P<ident>[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)
        | (?P<symbol><>|!=|<=|>=|\|\||[=<>(),+\-*/%])
        ",
    )
    .expect("valid template token regex")
});

/// Words that may appear in expressions besides paths and placeholders.
const EXPRESSION_KEYWORDS: &[&str] = &[
    "and", "or", "not", "is", "null", "like", "in", "between", "escape", "true", "false",
    "lower", "upper", "length", "abs", "coalesce", "trim", "case", "when", "then", "else",
    "end",
];

const FUNCTIONS: &[&str] = &["LOWER", "UPPER", "LENGTH", "ABS", "COALESCE", "TRIM"];

/// Words that end an alias position.
const CLAUSE_KEYWORDS: &[&str] = &[
    "join", "left", "inner", "outer", "fetch", "where", "order", "group", "set", "on",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Param(String),
    Str(String),
    Number(String),
    Ident(String),
    Symbol(String),
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Self::Ident(word) if word.eq_ignore_ascii_case(keyword))
    }

    fn is_symbol(&self, symbol: &str) -> bool {
        matches!(self, Self::Symbol(found) if found == symbol)
    }
}

fn tokenize(query: &str) -> RepoResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut position = 0;
    while position < query.len() {
        let captures = TOKEN_RE
            .captures_at(query, position)
            .filter(|captures| captures.get(0).is_some_and(|m| m.start() == position))
            .ok_or_else(|| {
                RepoError::malformed(format!(
                    "unexpected character at offset {position} in query template"
                ))
            })?;
        let Some(whole) = captures.get(0) else {
            break;
        };
        position = whole.end();

        if captures.name("space").is_some() {
            continue;
        }
        if captures.name("positional").is_some() {
            return Err(RepoError::malformed(
                "positional placeholders are not supported; bind by `:name`",
            ));
        }
        let token = if let Some(param) = captures.name("param") {
            Token::Param(param.as_str()[1..].to_string())
        } else if let Some(text) = captures.name("string") {
            Token::Str(text.as_str().to_string())
        } else if let Some(number) = captures.name("number") {
            Token::Number(number.as_str().to_string())
        } else if let Some(ident) = captures.name("ident") {
            Token::Ident(ident.as_str().to_string())
        } else {
            Token::Symbol(whole.as_str().to_string())
        };
        tokens.push(token);
    }
    Ok(tokens)
}

struct Cursor {
    tokens: Vec<Token>,
    position: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn is_done(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|token| token.is_keyword(keyword)) {
            self.position += 1;
            return true;
        }
        false
    }

    fn expect_keyword(&mut self, keyword: &str) -> RepoResult<()> {
        if self.eat_keyword(keyword) {
            return Ok(());
        }
        Err(RepoError::malformed(format!(
            "expected `{keyword}` in query template"
        )))
    }

    fn expect_ident(&mut self, what: &str) -> RepoResult<String> {
        match self.tokens.get(self.position) {
            Some(Token::Ident(word)) => {
                self.position += 1;
                Ok(word.clone())
            }
            _ => Err(RepoError::malformed(format!(
                "expected {what} in query template"
            ))),
        }
    }

    /// Optional alias: `[as] ident` unless the next word opens a clause.
    fn alias(&mut self) -> Option<String> {
        let explicit = self.eat_keyword("as");
        match self.peek() {
            Some(Token::Ident(word))
                if explicit
                    || (!word.contains('.')
                        && !CLAUSE_KEYWORDS
                            .iter()
                            .any(|keyword| word.eq_ignore_ascii_case(keyword))) =>
            {
                let word = word.clone();
                self.position += 1;
                Some(word)
            }
            _ => None,
        }
    }

    /// Tokens up to (not including) the first depth-0 token matching `stop`.
    fn take_until(&mut self, stop: impl Fn(&Cursor) -> bool) -> Vec<Token> {
        let mut taken = Vec::new();
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            if depth == 0 && stop(self) {
                break;
            }
            if token.is_symbol("(") {
                depth += 1;
            } else if token.is_symbol(")") {
                depth = depth.saturating_sub(1);
            }
            taken.push(token.clone());
            self.position += 1;
        }
        taken
    }

    fn at_order_by(&self) -> bool {
        self.peek().is_some_and(|token| token.is_keyword("order"))
            && self
                .tokens
                .get(self.position + 1)
                .is_some_and(|token| token.is_keyword("by"))
    }
}

/// Path rendering mode: select statements qualify columns with aliases,
/// bulk statements address the table directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Qualify {
    Alias,
    Bare,
}

struct Compiler<'a> {
    plan: QueryPlan,
    args: &'a Args,
    qualify: Qualify,
    used_aliases: Vec<String>,
}

impl Compiler<'_> {
    fn resolve_path(&mut self, path: &str) -> RepoResult<String> {
        let segments: Vec<&str> = path.split('.').collect();
        let head = segments[0];
        let root = self.plan.root;

        if head == self.plan.alias {
            self.note_alias(head);
            return match segments.as_slice() {
                [_] => Ok(self.column(head, root.id.column)),
                [_, property] => {
                    let column = root.column_of(property).ok_or_else(|| {
                        RepoError::malformed(format!("{} has no field `{property}`", root.name))
                    })?;
                    Ok(self.column(head, column))
                }
                [_, relation, property] => {
                    if self.qualify == Qualify::Bare {
                        return Err(RepoError::malformed(
                            "bulk statements cannot navigate relations",
                        ));
                    }
                    let relation_def = root.relation(relation).ok_or_else(|| {
                        RepoError::malformed(format!(
                            "{} has no relation `{relation}`",
                            root.name
                        ))
                    })?;
                    let target = (relation_def.target)();
                    let column = target.column_of(property).ok_or_else(|| {
                        RepoError::malformed(format!(
                            "{} has no field `{property}`",
                            target.name
                        ))
                    })?;
                    let alias = self.plan.ensure_join(relation_def, false);
                    self.note_alias(&alias);
                    Ok(format!("{alias}.{column}"))
                }
                _ => Err(RepoError::malformed(format!("path `{path}` is too deep"))),
            };
        }

        let join = self
            .plan
            .joins
            .iter()
            .find(|join| join.alias == head)
            .cloned()
            .ok_or_else(|| RepoError::malformed(format!("unknown alias `{head}` in `{path}`")))?;
        self.note_alias(&join.alias);
        match segments.as_slice() {
            [_] => Ok(format!("{}.{}", join.alias, join.target.id.column)),
            [_, property] => {
                let column = join.target.column_of(property).ok_or_else(|| {
                    RepoError::malformed(format!(
                        "{} has no field `{property}`",
                        join.target.name
                    ))
                })?;
                Ok(format!("{}.{column}", join.alias))
            }
            _ => Err(RepoError::malformed(format!("path `{path}` is too deep"))),
        }
    }

    fn column(&self, alias: &str, column: &str) -> String {
        match self.qualify {
            Qualify::Alias => format!("{alias}.{column}"),
            Qualify::Bare => column.to_string(),
        }
    }

    fn note_alias(&mut self, alias: &str) {
        if !self.used_aliases.iter().any(|used| used == alias) {
            self.used_aliases.push(alias.to_string());
        }
    }

    /// Renders an expression, appending bound values to `params`.
    fn render_expr(&mut self, tokens: &[Token], params: &mut Vec<Value>) -> RepoResult<String> {
        let mut pieces: Vec<String> = Vec::with_capacity(tokens.len());
        for (index, token) in tokens.iter().enumerate() {
            let piece = match token {
                Token::Ident(word) if word.contains('.') || self.plan.is_known_alias(word) => {
                    self.resolve_path(word)?
                }
                Token::Ident(word) => {
                    let lowered = word.to_ascii_lowercase();
                    if !EXPRESSION_KEYWORDS.contains(&lowered.as_str()) {
                        return Err(RepoError::malformed(format!(
                            "unknown identifier `{word}` in query template"
                        )));
                    }
                    lowered.to_ascii_uppercase()
                }
                Token::Param(name) => {
                    let value = self.args.get(name).ok_or_else(|| {
                        RepoError::malformed(format!("no argument bound to `:{name}`"))
                    })?;
                    match value {
                        Value::List(values) => {
                            let placeholders = vec!["?"; values.len()].join(", ");
                            params.extend(values.iter().cloned());
                            let parenthesized = index > 0
                                && tokens[index - 1].is_symbol("(")
                                && tokens.get(index + 1).is_some_and(|next| next.is_symbol(")"));
                            if parenthesized {
                                placeholders
                            } else {
                                format!("({placeholders})")
                            }
                        }
                        scalar => {
                            params.push(scalar.clone());
                            "?".to_string()
                        }
                    }
                }
                Token::Str(text) | Token::Number(text) | Token::Symbol(text) => text.clone(),
            };
            pieces.push(piece);
        }
        Ok(join_pieces(&pieces))
    }
}

fn join_pieces(pieces: &[String]) -> String {
    let mut sql = String::new();
    for (index, piece) in pieces.iter().enumerate() {
        let previous = index.checked_sub(1).map(|prev| pieces[prev].as_str());
        let tight = match previous {
            None => true,
            Some("(") => true,
            Some(prev) => {
                piece == ")"
                    || piece == ","
                    || (piece == "(" && FUNCTIONS.contains(&prev))
            }
        };
        if !tight {
            sql.push(' ');
        }
        sql.push_str(piece);
    }
    sql
}

/// Splits on depth-0 commas.
fn split_commas(tokens: &[Token]) -> Vec<Vec<Token>> {
    let mut items = vec![Vec::new()];
    let mut depth = 0usize;
    for token in tokens {
        if token.is_symbol("(") {
            depth += 1;
        } else if token.is_symbol(")") {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && token.is_symbol(",") {
            items.push(Vec::new());
            continue;
        }
        if let Some(current) = items.last_mut() {
            current.push(token.clone());
        }
    }
    items
}

/// Compiles a template against `schema`, binding `args` by name.
pub(super) fn compile(
    schema: &'static EntitySchema,
    query: &str,
    args: &Args,
    source: &str,
) -> RepoResult<QueryPlan> {
    let mut cursor = Cursor {
        tokens: tokenize(query)?,
        position: 0,
    };
    if cursor.eat_keyword("select") {
        compile_select(schema, &mut cursor, args, source)
    } else if cursor.eat_keyword("update") {
        compile_update(schema, &mut cursor, args, source)
    } else if cursor.eat_keyword("delete") {
        compile_delete(schema, &mut cursor, args, source)
    } else {
        Err(RepoError::malformed(
            "query template must start with select, update or delete",
        ))
    }
}

fn entity_and_alias(
    schema: &'static EntitySchema,
    cursor: &mut Cursor,
) -> RepoResult<String> {
    let entity = cursor.expect_ident("an entity name")?;
    if entity != schema.name {
        return Err(RepoError::malformed(format!(
            "unknown entity `{entity}`; this repository manages {}",
            schema.name
        )));
    }
    cursor
        .alias()
        .ok_or_else(|| RepoError::malformed(format!("`{entity}` needs an alias")))
}

fn compile_select(
    schema: &'static EntitySchema,
    cursor: &mut Cursor,
    args: &Args,
    source: &str,
) -> RepoResult<QueryPlan> {
    let distinct = cursor.eat_keyword("distinct");
    let projection_tokens = cursor.take_until(|cursor| {
        cursor.peek().is_some_and(|token| token.is_keyword("from"))
    });
    cursor.expect_keyword("from")?;
    let alias = entity_and_alias(schema, cursor)?;

    let mut plan = QueryPlan::new(PlanKind::Select, schema, alias, source);
    plan.distinct = distinct;
    parse_joins(&mut plan, cursor)?;

    let mut compiler = Compiler {
        plan,
        args,
        qualify: Qualify::Alias,
        used_aliases: Vec::new(),
    };
    compiler.plan.projection = parse_projection(&mut compiler, &projection_tokens)?;

    if cursor.eat_keyword("where") {
        let tokens = cursor.take_until(Cursor::at_order_by);
        compiler.used_aliases.clear();
        let mut params = Vec::new();
        let predicate = compiler.render_expr(&tokens, &mut params)?;
        if predicate.is_empty() {
            return Err(RepoError::malformed("empty where clause"));
        }
        compiler.plan.predicate = Some(predicate);
        compiler.plan.params = params;
        compiler.plan.predicate_aliases = std::mem::take(&mut compiler.used_aliases);
    }

    if cursor.eat_keyword("order") {
        cursor.expect_keyword("by")?;
        let tokens = cursor.take_until(|_| false);
        for item in split_commas(&tokens) {
            let (path, direction) = match item.as_slice() {
                [Token::Ident(path)] => (path, Direction::Asc),
                [Token::Ident(path), direction] if direction.is_keyword("asc") => {
                    (path, Direction::Asc)
                }
                [Token::Ident(path), direction] if direction.is_keyword("desc") => {
                    (path, Direction::Desc)
                }
                _ => return Err(RepoError::malformed("unsupported order by item")),
            };
            let expr = compiler.resolve_path(path)?;
            compiler.plan.order.push(OrderTerm { expr, direction });
        }
    }

    if !cursor.is_done() {
        return Err(RepoError::malformed("unexpected trailing tokens in query template"));
    }
    Ok(compiler.plan)
}

fn parse_joins(plan: &mut QueryPlan, cursor: &mut Cursor) -> RepoResult<()> {
    loop {
        let left = cursor.eat_keyword("left");
        if left {
            cursor.eat_keyword("outer");
        }
        let inner = !left && cursor.eat_keyword("inner");
        if left || inner {
            cursor.expect_keyword("join")?;
        } else if !cursor.eat_keyword("join") {
            return Ok(());
        }
        let fetch = cursor.eat_keyword("fetch");
        let path = cursor.expect_ident("a join path")?;
        let Some((owner, relation)) = path.split_once('.') else {
            return Err(RepoError::malformed(format!("join path `{path}` needs alias.relation")));
        };
        if owner != plan.alias {
            return Err(RepoError::malformed(format!(
                "joins must start from the root alias `{}`",
                plan.alias
            )));
        }
        let relation_def = plan.root.relation(relation).ok_or_else(|| {
            RepoError::malformed(format!("{} has no relation `{relation}`", plan.root.name))
        })?;
        if plan.join_for(relation).is_some() {
            return Err(RepoError::malformed(format!("relation `{relation}` joined twice")));
        }
        let alias = cursor
            .alias()
            .unwrap_or_else(|| format!("{}_{relation}", plan.alias));
        if plan.is_known_alias(&alias) {
            return Err(RepoError::malformed(format!("alias `{alias}` is already used")));
        }
        plan.joins.push(Join {
            relation: relation_def,
            target: (relation_def.target)(),
            alias,
            left,
            fetch,
        });
    }
}

fn parse_projection(compiler: &mut Compiler<'_>, tokens: &[Token]) -> RepoResult<Projection> {
    let items = split_commas(tokens);
    if items.len() == 1 {
        match items[0].as_slice() {
            [Token::Ident(alias)] if *alias == compiler.plan.alias => return Ok(Projection::Entity),
            [Token::Ident(function), open, inner @ .., close]
                if function.eq_ignore_ascii_case("count")
                    && open.is_symbol("(")
                    && close.is_symbol(")") =>
            {
                let (distinct, target) = match inner {
                    [Token::Ident(word), Token::Ident(path)]
                        if word.eq_ignore_ascii_case("distinct") =>
                    {
                        (true, path)
                    }
                    [Token::Ident(path)] => (false, path),
                    _ => return Err(RepoError::malformed("unsupported count expression")),
                };
                let expr = compiler.resolve_path(target)?;
                return Ok(Projection::Count(CountTarget::Expr { expr, distinct }));
            }
            _ => {}
        }
    }

    let mut columns = Vec::with_capacity(items.len());
    for item in items {
        let [Token::Ident(path)] = item.as_slice() else {
            return Err(RepoError::malformed("unsupported select item"));
        };
        if !path.contains('.') {
            return Err(RepoError::malformed(format!(
                "only the root entity `{}` or its paths can be selected",
                compiler.plan.alias
            )));
        }
        let expr = compiler.resolve_path(path)?;
        let label = path.rsplit('.').next().unwrap_or(path).to_string();
        columns.push(ProjectedColumn { expr, label });
    }
    Ok(Projection::Columns(columns))
}

fn compile_update(
    schema: &'static EntitySchema,
    cursor: &mut Cursor,
    args: &Args,
    source: &str,
) -> RepoResult<QueryPlan> {
    let alias = entity_and_alias(schema, cursor)?;
    cursor.expect_keyword("set")?;
    let assignment_tokens =
        cursor.take_until(|cursor| cursor.peek().is_some_and(|token| token.is_keyword("where")));

    let mut compiler = Compiler {
        plan: QueryPlan::new(PlanKind::Update, schema, alias, source),
        args,
        qualify: Qualify::Bare,
        used_aliases: Vec::new(),
    };
    let mut assignments = Vec::new();
    let mut assignment_params = Vec::new();
    for item in split_commas(&assignment_tokens) {
        let [Token::Ident(path), equals, value @ ..] = item.as_slice() else {
            return Err(RepoError::malformed("malformed set clause"));
        };
        if !equals.is_symbol("=") || value.is_empty() {
            return Err(RepoError::malformed("malformed set clause"));
        }
        let column = compiler.resolve_path(path)?;
        if column == schema.id.column {
            return Err(RepoError::malformed("bulk updates cannot change ids"));
        }
        let value = compiler.render_expr(value, &mut assignment_params)?;
        assignments.push(format!("{column} = {value}"));
    }
    if assignments.is_empty() {
        return Err(RepoError::malformed("update without assignments"));
    }
    compiler.plan.assignments = Some(assignments.join(", "));
    compiler.plan.assignment_params = assignment_params;
    compile_bulk_where(compiler, cursor)
}

fn compile_delete(
    schema: &'static EntitySchema,
    cursor: &mut Cursor,
    args: &Args,
    source: &str,
) -> RepoResult<QueryPlan> {
    cursor.eat_keyword("from");
    let alias = entity_and_alias(schema, cursor)?;
    let compiler = Compiler {
        plan: QueryPlan::new(PlanKind::Delete, schema, alias, source),
        args,
        qualify: Qualify::Bare,
        used_aliases: Vec::new(),
    };
    compile_bulk_where(compiler, cursor)
}

fn compile_bulk_where(mut compiler: Compiler<'_>, cursor: &mut Cursor) -> RepoResult<QueryPlan> {
    if cursor.eat_keyword("where") {
        let tokens = cursor.take_until(|_| false);
        let mut params = Vec::new();
        let predicate = compiler.render_expr(&tokens, &mut params)?;
        if predicate.is_empty() {
            return Err(RepoError::malformed("empty where clause"));
        }
        compiler.plan.predicate = Some(predicate);
        compiler.plan.params = params;
    }
    if !cursor.is_done() {
        return Err(RepoError::malformed("unexpected trailing tokens in query template"));
    }
    Ok(compiler.plan)
}

#[cfg(test)]
mod tests {
    use super::compile;
    use crate::model::entity::Entity;
    use crate::model::member::Member;
    use crate::model::value::Value;
    use crate::query::plan::{PlanKind, Projection};
    use crate::query::Args;
    use crate::repo::error::RepoError;

    #[test]
    fn named_placeholders_bind_by_name() {
        let args = Args::new().with("age", 10).with("username", "AAA");
        let plan = compile(
            Member::schema(),
            "select m from Member m where m.username = :username and m.age = :age",
            &args,
            "findUser",
        )
        .unwrap();
        assert_eq!(
            plan.predicate.as_deref(),
            Some("m.username = ? AND m.age = ?")
        );
        assert_eq!(plan.params, vec![Value::from("AAA"), Value::Integer(10)]);
    }

    #[test]
    fn list_argument_expands_in_clause() {
        let args = Args::new().with("names", vec!["AAA", "BBB"]);
        let plan = compile(
            Member::schema(),
            "select m from Member m where m.username in :names",
            &args,
            "findByNames",
        )
        .unwrap();
        assert_eq!(plan.predicate.as_deref(), Some("m.username IN (?, ?)"));
    }

    #[test]
    fn fetch_join_and_projection() {
        let plan = compile(
            Member::schema(),
            "select m from Member m left join fetch m.team",
            &Args::new(),
            "fetch",
        )
        .unwrap();
        assert_eq!(plan.fetched_relations(), vec!["team"]);
        assert!(plan.joins[0].left);

        let plan = compile(
            Member::schema(),
            "select m.id, m.username, t.name from Member m join m.team t",
            &Args::new(),
            "dto",
        )
        .unwrap();
        let Projection::Columns(columns) = plan.projection else {
            panic!("expected column projection");
        };
        assert_eq!(columns[2].expr, "t.name");
        assert_eq!(columns[0].label, "id");
    }

    #[test]
    fn update_renders_unqualified_columns() {
        let plan = compile(
            Member::schema(),
            "update Member m set m.age = m.age + 1 where m.age >= :age",
            &Args::new().with("age", 20),
            "bulkAgePlus",
        )
        .unwrap();
        assert_eq!(plan.kind, PlanKind::Update);
        let statement = plan.write_statement().unwrap();
        assert_eq!(statement.sql, "UPDATE member SET age = age + 1 WHERE age >= ?");
        assert_eq!(statement.params, vec![Value::Integer(20)]);
    }

    #[test]
    fn missing_binding_is_malformed() {
        let err = compile(
            Member::schema(),
            "select m from Member m where m.age = :age",
            &Args::new(),
            "t",
        )
        .unwrap_err();
        assert!(matches!(err, RepoError::Malformed(_)));
    }

    #[test]
    fn positional_placeholder_is_malformed() {
        let err = compile(
            Member::schema(),
            "select m from Member m where m.age = ?1",
            &Args::new(),
            "t",
        )
        .unwrap_err();
        assert!(err.to_string().contains("positional"));
    }

    #[test]
    fn unknown_field_and_entity_are_malformed() {
        assert!(compile(
            Member::schema(),
            "select m from Member m where m.nickname = 'x'",
            &Args::new(),
            "t"
        )
        .is_err());
        assert!(compile(Member::schema(), "select t from Team t", &Args::new(), "t").is_err());
    }

    #[test]
    fn order_by_resolves_paths() {
        let plan = compile(
            Member::schema(),
            "select m from Member m where m.age = :age order by m.username desc",
            &Args::new().with("age", 10),
            "t",
        )
        .unwrap();
        assert_eq!(plan.order[0].expr, "m.username");
    }
}
