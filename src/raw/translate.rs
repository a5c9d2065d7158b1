use sqlparser::ast as sql_ast;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::core::{DbError, Result, Value};
use crate::filter::{Filter, ScalarFilter, ScalarOp};
use crate::query::OrderBy;

/// A raw statement lowered onto the typed engine's vocabulary.
#[derive(Debug)]
pub(crate) enum RawStatement {
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
}

#[derive(Debug)]
pub(crate) struct SelectStmt {
    pub entity: String,
    pub projection: Projection,
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: u64,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Projection {
    All,
    Columns(Vec<String>),
    CountAll,
}

#[derive(Debug)]
pub(crate) struct InsertStmt {
    pub entity: String,
    /// Empty when the statement has no column list, in which case each
    /// VALUES row must cover every field in registry order.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug)]
pub(crate) struct UpdateStmt {
    pub entity: String,
    pub assignments: Vec<(String, Value)>,
    pub filter: Option<Filter>,
}

#[derive(Debug)]
pub(crate) struct DeleteStmt {
    pub entity: String,
    pub filter: Option<Filter>,
}

/// Parses one SQL statement and lowers it into [`RawStatement`],
/// substituting `$n` placeholders from the bound parameter list.
pub(crate) struct SqlTranslator<'a> {
    dialect: PostgreSqlDialect,
    params: &'a [Value],
}

impl<'a> SqlTranslator<'a> {
    pub fn new(params: &'a [Value]) -> Self {
        Self {
            dialect: PostgreSqlDialect {},
            params,
        }
    }

    pub fn translate(&self, sql: &str) -> Result<RawStatement> {
        let mut statements =
            Parser::parse_sql(&self.dialect, sql).map_err(|e| DbError::Parse(e.to_string()))?;

        if statements.len() != 1 {
            return Err(DbError::Unsupported(format!(
                "raw SQL must contain exactly one statement, got {}",
                statements.len()
            )));
        }
        self.convert_statement(statements.remove(0))
    }

    fn convert_statement(&self, stmt: sql_ast::Statement) -> Result<RawStatement> {
        match stmt {
            sql_ast::Statement::Query(query) => {
                Ok(RawStatement::Select(self.convert_query(*query)?))
            }
            sql_ast::Statement::Insert(insert) => {
                Ok(RawStatement::Insert(self.convert_insert(insert)?))
            }
            sql_ast::Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => Ok(RawStatement::Update(self.convert_update(
                table,
                assignments,
                selection,
            )?)),
            sql_ast::Statement::Delete(delete) => {
                Ok(RawStatement::Delete(self.convert_delete(delete)?))
            }
            other => Err(DbError::Unsupported(format!(
                "statement not supported in raw SQL: {other}"
            ))),
        }
    }

    fn convert_query(&self, query: sql_ast::Query) -> Result<SelectStmt> {
        let sql_ast::SetExpr::Select(select) = *query.body else {
            return Err(DbError::Unsupported(
                "only plain SELECT queries are supported".to_string(),
            ));
        };

        if select.from.len() != 1 {
            return Err(DbError::Unsupported(
                "SELECT must name exactly one table".to_string(),
            ));
        }
        if !select.from[0].joins.is_empty() {
            return Err(DbError::Unsupported(
                "JOIN is not supported; use the typed relation surface".to_string(),
            ));
        }
        let entity = match &select.from[0].relation {
            sql_ast::TableFactor::Table { name, .. } => object_name(name)?,
            _ => {
                return Err(DbError::Unsupported(
                    "complex table references are not supported".to_string(),
                ));
            }
        };

        let projection = self.convert_projection(select.projection)?;
        let filter = select
            .selection
            .map(|expr| self.convert_filter(expr))
            .transpose()?;
        let order_by = self.convert_order_by(query.order_by)?;
        let (limit, offset) = self.convert_limit_clause(query.limit_clause)?;

        Ok(SelectStmt {
            entity,
            projection,
            filter,
            order_by,
            limit,
            offset,
        })
    }

    fn convert_projection(&self, items: Vec<sql_ast::SelectItem>) -> Result<Projection> {
        if items.len() == 1 {
            match &items[0] {
                sql_ast::SelectItem::Wildcard(_) => return Ok(Projection::All),
                sql_ast::SelectItem::UnnamedExpr(sql_ast::Expr::Function(func)) => {
                    return convert_count(func);
                }
                _ => {}
            }
        }

        let mut columns = Vec::with_capacity(items.len());
        for item in items {
            match item {
                sql_ast::SelectItem::UnnamedExpr(sql_ast::Expr::Identifier(ident)) => {
                    columns.push(ident.value);
                }
                other => {
                    return Err(DbError::Unsupported(format!(
                        "unsupported select item: {other}"
                    )));
                }
            }
        }
        Ok(Projection::Columns(columns))
    }

    fn convert_order_by(&self, order_by: Option<sql_ast::OrderBy>) -> Result<Vec<OrderBy>> {
        let Some(order_by) = order_by else {
            return Ok(Vec::new());
        };

        let sql_ast::OrderByKind::Expressions(exprs) = order_by.kind else {
            return Err(DbError::Unsupported("ORDER BY ALL not supported".to_string()));
        };

        exprs
            .into_iter()
            .map(|order| {
                let sql_ast::Expr::Identifier(ident) = order.expr else {
                    return Err(DbError::Unsupported(
                        "ORDER BY must name plain columns".to_string(),
                    ));
                };
                let descending = order.options.asc.map(|asc| !asc).unwrap_or(false);
                Ok(if descending {
                    OrderBy::desc(ident.value)
                } else {
                    OrderBy::asc(ident.value)
                })
            })
            .collect()
    }

    fn convert_limit_clause(
        &self,
        clause: Option<sql_ast::LimitClause>,
    ) -> Result<(Option<u64>, u64)> {
        let Some(clause) = clause else {
            return Ok((None, 0));
        };

        match clause {
            sql_ast::LimitClause::LimitOffset { limit, offset, .. } => {
                let limit = limit
                    .map(|expr| self.numeric(expr, "LIMIT"))
                    .transpose()?;
                let offset = offset
                    .map(|offset| self.numeric(offset.value, "OFFSET"))
                    .transpose()?
                    .unwrap_or(0);
                Ok((limit, offset))
            }
            sql_ast::LimitClause::OffsetCommaLimit { offset, limit } => {
                let offset = self.numeric(offset, "OFFSET")?;
                let limit = self.numeric(limit, "LIMIT")?;
                Ok((Some(limit), offset))
            }
        }
    }

    fn numeric(&self, expr: sql_ast::Expr, clause: &str) -> Result<u64> {
        match self.convert_value_expr(expr)? {
            Value::Integer(n) if n >= 0 => Ok(n as u64),
            other => Err(DbError::Parse(format!(
                "{clause} expects a non-negative integer, got {other}"
            ))),
        }
    }

    fn convert_insert(&self, insert: sql_ast::Insert) -> Result<InsertStmt> {
        let entity = match &insert.table {
            sql_ast::TableObject::TableName(name) => object_name(name)?,
            _ => {
                return Err(DbError::Unsupported(
                    "INSERT target must be a plain table".to_string(),
                ));
            }
        };
        let columns: Vec<String> = insert.columns.into_iter().map(|id| id.value).collect();

        let values = match insert.source {
            Some(source) => match *source.body {
                sql_ast::SetExpr::Values(values) => values,
                _ => {
                    return Err(DbError::Unsupported(
                        "INSERT requires a VALUES clause".to_string(),
                    ));
                }
            },
            None => {
                return Err(DbError::Unsupported(
                    "INSERT requires a VALUES clause".to_string(),
                ));
            }
        };

        let rows = values
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|expr| self.convert_value_expr(expr))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(InsertStmt {
            entity,
            columns,
            rows,
        })
    }

    fn convert_update(
        &self,
        table: sql_ast::TableWithJoins,
        assignments: Vec<sql_ast::Assignment>,
        selection: Option<sql_ast::Expr>,
    ) -> Result<UpdateStmt> {
        let entity = match &table.relation {
            sql_ast::TableFactor::Table { name, .. } => object_name(name)?,
            _ => {
                return Err(DbError::Unsupported(
                    "UPDATE target must be a plain table".to_string(),
                ));
            }
        };

        let assignments = assignments
            .into_iter()
            .map(|assign| {
                let column = match &assign.target {
                    sql_ast::AssignmentTarget::ColumnName(name) => {
                        if name.0.len() != 1 {
                            return Err(DbError::Unsupported(
                                "qualified column names are not supported in SET".to_string(),
                            ));
                        }
                        object_name(name)?
                    }
                    _ => {
                        return Err(DbError::Unsupported(
                            "only simple column names are supported in SET".to_string(),
                        ));
                    }
                };
                let value = self.convert_value_expr(assign.value)?;
                Ok((column, value))
            })
            .collect::<Result<Vec<_>>>()?;

        let filter = selection
            .map(|expr| self.convert_filter(expr))
            .transpose()?;

        Ok(UpdateStmt {
            entity,
            assignments,
            filter,
        })
    }

    fn convert_delete(&self, delete: sql_ast::Delete) -> Result<DeleteStmt> {
        let tables = match delete.from {
            sql_ast::FromTable::WithFromKeyword(tables)
            | sql_ast::FromTable::WithoutKeyword(tables) => tables,
        };
        let entity = match tables.first() {
            Some(table) => match &table.relation {
                sql_ast::TableFactor::Table { name, .. } => object_name(name)?,
                _ => {
                    return Err(DbError::Unsupported(
                        "DELETE target must be a plain table".to_string(),
                    ));
                }
            },
            None => return Err(DbError::Parse("DELETE requires a FROM clause".to_string())),
        };

        let filter = delete
            .selection
            .map(|expr| self.convert_filter(expr))
            .transpose()?;

        Ok(DeleteStmt { entity, filter })
    }

    fn convert_filter(&self, expr: sql_ast::Expr) -> Result<Filter> {
        match expr {
            sql_ast::Expr::Nested(inner) => self.convert_filter(*inner),
            sql_ast::Expr::UnaryOp {
                op: sql_ast::UnaryOperator::Not,
                expr,
            } => Ok(Filter::not([self.convert_filter(*expr)?])),
            sql_ast::Expr::BinaryOp { left, op, right } => self.convert_binary(*left, op, *right),
            sql_ast::Expr::IsNull(inner) => Ok(Filter::is_null(column(*inner)?)),
            sql_ast::Expr::IsNotNull(inner) => Ok(Filter::is_not_null(column(*inner)?)),
            sql_ast::Expr::InList {
                expr,
                list,
                negated,
            } => {
                let field = column(*expr)?;
                let values = list
                    .into_iter()
                    .map(|e| self.convert_value_expr(e))
                    .collect::<Result<Vec<_>>>()?;
                Ok(if negated {
                    Filter::not_in(field, values)
                } else {
                    Filter::is_in(field, values)
                })
            }
            sql_ast::Expr::Like {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            } => self.convert_like(*expr, *pattern, negated, escape_char.is_some(), false),
            sql_ast::Expr::ILike {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            } => self.convert_like(*expr, *pattern, negated, escape_char.is_some(), true),
            sql_ast::Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let field = column(*expr)?;
                let bounds = Filter::and([
                    Filter::gte(field.clone(), self.convert_value_expr(*low)?),
                    Filter::lte(field, self.convert_value_expr(*high)?),
                ]);
                Ok(if negated {
                    Filter::not([bounds])
                } else {
                    bounds
                })
            }
            other => Err(DbError::Unsupported(format!(
                "unsupported WHERE expression: {other}"
            ))),
        }
    }

    fn convert_binary(
        &self,
        left: sql_ast::Expr,
        op: sql_ast::BinaryOperator,
        right: sql_ast::Expr,
    ) -> Result<Filter> {
        use sql_ast::BinaryOperator as SqlOp;

        match op {
            SqlOp::And => Ok(Filter::and([
                self.convert_filter(left)?,
                self.convert_filter(right)?,
            ])),
            SqlOp::Or => Ok(Filter::or([
                self.convert_filter(left)?,
                self.convert_filter(right)?,
            ])),
            SqlOp::Eq => self.comparison(left, right, ScalarOp::Equals),
            SqlOp::NotEq => self.comparison(left, right, ScalarOp::NotEquals),
            SqlOp::Lt => self.comparison(left, right, ScalarOp::Lt),
            SqlOp::LtEq => self.comparison(left, right, ScalarOp::Lte),
            SqlOp::Gt => self.comparison(left, right, ScalarOp::Gt),
            SqlOp::GtEq => self.comparison(left, right, ScalarOp::Gte),
            other => Err(DbError::Unsupported(format!(
                "unsupported operator in WHERE: {other}"
            ))),
        }
    }

    fn comparison(
        &self,
        left: sql_ast::Expr,
        right: sql_ast::Expr,
        op: fn(Value) -> ScalarOp,
    ) -> Result<Filter> {
        let field = column(left)?;
        let value = self.convert_value_expr(right)?;
        Ok(Filter::Scalar(ScalarFilter {
            field,
            op: op(value),
        }))
    }

    fn convert_like(
        &self,
        expr: sql_ast::Expr,
        pattern: sql_ast::Expr,
        negated: bool,
        escaped: bool,
        case_insensitive: bool,
    ) -> Result<Filter> {
        if escaped {
            return Err(DbError::Unsupported("LIKE ESCAPE not supported".to_string()));
        }
        let field = column(expr)?;
        let pattern = match self.convert_value_expr(pattern)? {
            Value::Text(text) => text,
            other => {
                return Err(DbError::TypeMismatch(format!(
                    "LIKE pattern must be text, got {}",
                    other.type_name()
                )));
            }
        };
        let like = Filter::Scalar(ScalarFilter {
            field,
            op: ScalarOp::Like {
                pattern,
                case_insensitive,
            },
        });
        Ok(if negated { Filter::not([like]) } else { like })
    }

    fn convert_value_expr(&self, expr: sql_ast::Expr) -> Result<Value> {
        match expr {
            sql_ast::Expr::Value(value) => self.convert_value(value.value),
            sql_ast::Expr::UnaryOp {
                op: sql_ast::UnaryOperator::Minus,
                expr,
            } => match self.convert_value_expr(*expr)? {
                Value::Integer(n) => Ok(Value::Integer(-n)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(DbError::TypeMismatch(format!(
                    "cannot negate {}",
                    other.type_name()
                ))),
            },
            other => Err(DbError::Unsupported(format!(
                "expected a literal or parameter, got: {other}"
            ))),
        }
    }

    fn convert_value(&self, value: sql_ast::Value) -> Result<Value> {
        match value {
            sql_ast::Value::Number(n, _) => {
                if let Ok(i) = n.parse::<i64>() {
                    Ok(Value::Integer(i))
                } else if let Ok(f) = n.parse::<f64>() {
                    Ok(Value::Float(f))
                } else {
                    Err(DbError::TypeMismatch(format!("invalid number: {n}")))
                }
            }
            sql_ast::Value::SingleQuotedString(s) | sql_ast::Value::DoubleQuotedString(s) => {
                Ok(Value::Text(s))
            }
            sql_ast::Value::Boolean(b) => Ok(Value::Boolean(b)),
            sql_ast::Value::Null => Ok(Value::Null),
            sql_ast::Value::Placeholder(marker) => self.bind(&marker),
            other => Err(DbError::Unsupported(format!(
                "unsupported literal: {other}"
            ))),
        }
    }

    fn bind(&self, marker: &str) -> Result<Value> {
        let index: usize = marker
            .strip_prefix('$')
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| DbError::Parse(format!("unsupported parameter marker: {marker}")))?;

        if index == 0 || index > self.params.len() {
            return Err(DbError::Validation(format!(
                "parameter {marker} is out of range ({} bound)",
                self.params.len()
            )));
        }
        Ok(self.params[index - 1].clone())
    }
}

fn convert_count(func: &sql_ast::Function) -> Result<Projection> {
    if !func.name.to_string().eq_ignore_ascii_case("COUNT") {
        return Err(DbError::Unsupported(format!(
            "unsupported function in projection: {}",
            func.name
        )));
    }
    let wildcard = matches!(
        &func.args,
        sql_ast::FunctionArguments::List(list)
            if matches!(
                list.args.as_slice(),
                [sql_ast::FunctionArg::Unnamed(sql_ast::FunctionArgExpr::Wildcard)]
            )
    );
    if !wildcard {
        return Err(DbError::Unsupported("only COUNT(*) is supported".to_string()));
    }
    Ok(Projection::CountAll)
}

fn object_name(name: &sql_ast::ObjectName) -> Result<String> {
    match name.0.last() {
        Some(sql_ast::ObjectNamePart::Identifier(ident)) => Ok(ident.value.clone()),
        _ => Err(DbError::Parse(format!("invalid object name: {name}"))),
    }
}

fn column(expr: sql_ast::Expr) -> Result<String> {
    match expr {
        sql_ast::Expr::Identifier(ident) => Ok(ident.value),
        sql_ast::Expr::CompoundIdentifier(mut idents) => idents
            .pop()
            .map(|ident| ident.value)
            .ok_or_else(|| DbError::Parse("empty column reference".to_string())),
        other => Err(DbError::Unsupported(format!(
            "expected a column name, got: {other}"
        ))),
    }
}
