#![allow(dead_code)]

use std::sync::{Arc, Once};

use entity_query::{
    Evaluator, EvaluatorOptions, Record, RecordRef, RecordType, Result, SymbolGraph, TypeCatalog,
    TypeExpr, Value,
};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("entity_query=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

pub fn catalog() -> Result<TypeCatalog> {
    let mut catalog = TypeCatalog::new();
    catalog.register_record(
        RecordType::new("Body")
            .field("name", TypeExpr::str())
            .queryable(),
    )?;
    catalog.register_record(RecordType::new("Container").extends("Body"))?;
    catalog.register_record(RecordType::new("Handle").extends("Body"))?;
    catalog.register_record(
        RecordType::new("Drawer")
            .extends("Body")
            .field("handle", TypeExpr::optional(TypeExpr::named("Handle"))),
    )?;
    catalog.register_record(
        RecordType::new("Cabinet")
            .extends("Container")
            .field("drawers", TypeExpr::list(TypeExpr::named("Drawer"))),
    )?;
    catalog.register_record(
        RecordType::new("Connection")
            .field("parent", TypeExpr::named("Body"))
            .field("child", TypeExpr::named("Body"))
            .queryable(),
    )?;
    catalog.register_record(RecordType::new("FixedConnection").extends("Connection"))?;
    catalog.register_record(RecordType::new("RevoluteConnection").extends("Connection"))?;
    catalog.register_record(RecordType::new("Note").field("text", TypeExpr::str()))?;
    Ok(catalog)
}

/// A kitchen: two containers with handles wired by connections, and three
/// cabinets with drawers.
pub struct World {
    pub catalog: Arc<TypeCatalog>,
    pub registry: Arc<SymbolGraph>,
    pub c1: RecordRef,
    pub c2: RecordRef,
    pub h1: RecordRef,
    pub h2: RecordRef,
    pub fixed1: RecordRef,
    pub fixed2: RecordRef,
    pub revolute: RecordRef,
    pub d1: RecordRef,
    pub d2: RecordRef,
    pub d3: RecordRef,
    pub cab1: RecordRef,
    pub cab2: RecordRef,
    pub cab3: RecordRef,
}

impl World {
    pub fn new() -> Result<Self> {
        init_tracing();
        let catalog = Arc::new(catalog()?);
        let registry = Arc::new(SymbolGraph::new());

        let c1 = Record::new("Container", [("name", "C1")]);
        let c2 = Record::new("Container", [("name", "C2")]);
        let h1 = Record::new("Handle", [("name", "H1")]);
        let h2 = Record::new("Handle", [("name", "H2")]);
        let connection = |ty: &str, parent: &RecordRef, child: &RecordRef| {
            Record::new(
                ty,
                [("parent", Value::from(parent)), ("child", Value::from(child))],
            )
        };
        let fixed1 = connection("FixedConnection", &c1, &h1);
        let fixed2 = connection("FixedConnection", &c2, &h2);
        let revolute = connection("RevoluteConnection", &c1, &h2);

        let d1 = Record::new(
            "Drawer",
            [("name", Value::from("D1")), ("handle", Value::from(&h1))],
        );
        let d2 = Record::new(
            "Drawer",
            [("name", Value::from("D2")), ("handle", Value::from(&h2))],
        );
        let d3 = Record::new("Drawer", [("name", "D3")]);
        let cabinet = |name: &str, drawers: Vec<RecordRef>| {
            Record::new(
                "Cabinet",
                [("name", Value::from(name)), ("drawers", Value::from(drawers))],
            )
        };
        let cab1 = cabinet("Cab1", vec![d1.clone(), d2.clone()]);
        let cab2 = cabinet("Cab2", vec![d3.clone()]);
        let cab3 = cabinet("Cab3", Vec::new());

        registry.extend([
            &c1, &c2, &h1, &h2, &fixed1, &fixed2, &revolute, &d1, &d2, &d3, &cab1, &cab2, &cab3,
        ]);
        Ok(Self {
            catalog,
            registry,
            c1,
            c2,
            h1,
            h2,
            fixed1,
            fixed2,
            revolute,
            d1,
            d2,
            d3,
            cab1,
            cab2,
            cab3,
        })
    }

    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(Arc::clone(&self.catalog), Arc::clone(&self.registry))
    }

    pub fn evaluator_with(&self, options: EvaluatorOptions) -> Evaluator {
        Evaluator::with_options(Arc::clone(&self.catalog), Arc::clone(&self.registry), options)
    }

    pub fn connections(&self) -> Vec<RecordRef> {
        vec![self.fixed1.clone(), self.fixed2.clone(), self.revolute.clone()]
    }
}

pub fn values<'a>(records: impl IntoIterator<Item = &'a RecordRef>) -> Vec<Value> {
    records.into_iter().map(Value::from).collect()
}
