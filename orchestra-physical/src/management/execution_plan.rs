//! This module defines [ExecutionPlan], which describes how the result
//! of a single rule is computed from the tables of a
//! [DatabaseInstance][super::database::DatabaseInstance]
//! and written back into one of them.

use crate::datavalues::DataValue;

/// Identifier of a variable within one [ExecutionPlan]
pub type VariableMarker = usize;

/// Content of a column in a scan or in the head of a plan
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnBinding {
    /// Column is bound to (or binds) a variable
    Variable(VariableMarker),
    /// Column must be equal to the given value
    Constant(DataValue),
}

impl ColumnBinding {
    /// Return the [VariableMarker] if this binding is a variable.
    pub fn marker(&self) -> Option<VariableMarker> {
        match self {
            ColumnBinding::Variable(marker) => Some(*marker),
            ColumnBinding::Constant(_) => None,
        }
    }
}

/// Scan over a table, matching each row against a list of [ColumnBinding]s
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanNode {
    table: String,
    columns: Vec<ColumnBinding>,
    nullable: Vec<bool>,
}

impl ScanNode {
    /// Create a new [ScanNode] where every column may contain nulls.
    pub fn new(table: impl Into<String>, columns: Vec<ColumnBinding>) -> Self {
        let nullable = vec![true; columns.len()];
        Self {
            table: table.into(),
            columns,
            nullable,
        }
    }

    /// Mark columns that must not match a null value.
    pub fn with_nullable(mut self, nullable: Vec<bool>) -> Self {
        debug_assert_eq!(nullable.len(), self.columns.len());
        self.nullable = nullable;
        self
    }

    /// Return the name of the scanned table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Return the column bindings of this scan.
    pub fn columns(&self) -> &[ColumnBinding] {
        &self.columns
    }

    /// Return whether the column at the given index may match a null.
    pub fn is_nullable(&self, index: usize) -> bool {
        self.nullable.get(index).copied().unwrap_or(true)
    }
}

/// Computes a skolem term from already bound key columns and binds it to a variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkolemNode {
    output: VariableMarker,
    function: String,
    keys: Vec<ColumnBinding>,
}

impl SkolemNode {
    /// Create a new [SkolemNode].
    pub fn new(output: VariableMarker, function: impl Into<String>, keys: Vec<ColumnBinding>) -> Self {
        Self {
            output,
            function: function.into(),
            keys,
        }
    }

    /// Return the variable that receives the skolem value.
    pub fn output(&self) -> VariableMarker {
        self.output
    }

    /// Return the name of the skolem function.
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Return the key columns the function is applied to.
    pub fn keys(&self) -> &[ColumnBinding] {
        &self.keys
    }
}

/// Column of the rows written by an [ExecutionPlan]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadColumn {
    /// Variable or constant
    Binding(ColumnBinding),
    /// Skolem term built from bound values
    Skolem {
        /// Name of the skolem function
        function: String,
        /// Arguments of the function
        arguments: Vec<ColumnBinding>,
    },
}

/// How the rows computed by an [ExecutionPlan] change the head table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMode {
    /// Add computed rows
    Insert,
    /// Remove computed rows
    Delete,
    /// Replace the content of the head table by the computed rows
    Replace,
    /// Remove all rows of the head table; the body is ignored
    Truncate,
}

/// Description of a single conjunctive query with a target table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    positive: Vec<ScanNode>,
    skolems: Vec<SkolemNode>,
    negative: Vec<ScanNode>,
    head_table: String,
    head: Vec<HeadColumn>,
    mode: WriteMode,
}

impl ExecutionPlan {
    /// Create a new [ExecutionPlan] with an empty body.
    pub fn new(head_table: impl Into<String>, head: Vec<HeadColumn>, mode: WriteMode) -> Self {
        Self {
            positive: Vec::new(),
            skolems: Vec::new(),
            negative: Vec::new(),
            head_table: head_table.into(),
            head,
            mode,
        }
    }

    /// Create a plan that removes all rows from the given table.
    pub fn truncate(table: impl Into<String>) -> Self {
        Self::new(table, Vec::new(), WriteMode::Truncate)
    }

    /// Add a positive scan to the body.
    ///
    /// Scans are joined in the order they are added.
    pub fn add_positive(&mut self, scan: ScanNode) {
        self.positive.push(scan);
    }

    /// Add a skolem computation, evaluated after all positive scans.
    pub fn add_skolem(&mut self, skolem: SkolemNode) {
        self.skolems.push(skolem);
    }

    /// Add a negated scan.
    ///
    /// Variables of a negated scan not bound by the positive part act as wildcards.
    pub fn add_negative(&mut self, scan: ScanNode) {
        self.negative.push(scan);
    }

    /// Return the positive scans.
    pub fn positive(&self) -> &[ScanNode] {
        &self.positive
    }

    /// Return the skolem computations.
    pub fn skolems(&self) -> &[SkolemNode] {
        &self.skolems
    }

    /// Return the negated scans.
    pub fn negative(&self) -> &[ScanNode] {
        &self.negative
    }

    /// Return the name of the table that is written.
    pub fn head_table(&self) -> &str {
        &self.head_table
    }

    /// Return the head columns.
    pub fn head(&self) -> &[HeadColumn] {
        &self.head
    }

    /// Return the [WriteMode].
    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Return the number of variable markers used in this plan.
    pub fn num_markers(&self) -> usize {
        let scan_markers = self
            .positive
            .iter()
            .chain(self.negative.iter())
            .flat_map(|scan| scan.columns.iter())
            .filter_map(ColumnBinding::marker);
        let skolem_markers = self.skolems.iter().flat_map(|skolem| {
            std::iter::once(skolem.output).chain(skolem.keys.iter().filter_map(ColumnBinding::marker))
        });
        let head_markers = self.head.iter().flat_map(|column| match column {
            HeadColumn::Binding(binding) => binding.marker().into_iter().collect::<Vec<_>>(),
            HeadColumn::Skolem { arguments, .. } => {
                arguments.iter().filter_map(ColumnBinding::marker).collect()
            }
        });

        scan_markers
            .chain(skolem_markers)
            .chain(head_markers)
            .max()
            .map_or(0, |max| max + 1)
    }
}

/// Outcome of evaluating an [ExecutionPlan]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Number of distinct rows computed by the body
    pub computed: usize,
    /// Number of rows that were actually added to or removed from the head table
    pub changed: usize,
}
