//! Actions: a closed set of kinds sharing name, parameters and precondition.

use crate::debugger::SourceInfo;
use crate::errors::{ParseError, ParseResult};
use crate::kr::{unify_all, MentalStateCondition, Substitution, Term, Update};
use std::fmt;
use std::sync::Arc;

/// Illocutionary force of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mood {
    Indicative,
    Imperative,
    Interrogative,
}

impl Mood {
    /// Split a message content term into its mood and the wrapped formula.
    pub fn of(content: &Term) -> (Mood, &Term) {
        match content.signature() {
            Some(("imperative", 1)) => (Mood::Imperative, &content.args()[0]),
            Some(("interrogative", 1)) => (Mood::Interrogative, &content.args()[0]),
            _ => (Mood::Indicative, content),
        }
    }
}

/// A user-declared action with pre- and postconditions.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpecification {
    pub name: String,
    /// Formal parameters, in the specification's own variable scope
    pub params: Vec<Term>,
    pub precondition: MentalStateCondition,
    /// Beliefs added (`add`) and removed (`remove`) after execution
    pub postcondition: Update,
    /// Whether the environment must be told about the action
    pub external: bool,
    pub source: Option<SourceInfo>,
}

impl ActionSpecification {
    pub fn new(name: &str, params: Vec<Term>) -> Self {
        Self {
            name: name.to_string(),
            params,
            precondition: MentalStateCondition::always_true(),
            postcondition: Update::default(),
            external: false,
            source: None,
        }
    }

    pub fn with_precondition(mut self, precondition: MentalStateCondition) -> Self {
        self.precondition = precondition;
        self
    }

    pub fn with_postcondition(mut self, postcondition: Update) -> Self {
        self.postcondition = postcondition;
        self
    }

    pub fn external(mut self, external: bool) -> Self {
        self.external = external;
        self
    }

    pub fn at(mut self, source: SourceInfo) -> Self {
        self.source = Some(source);
        self
    }

    pub fn signature(&self) -> (&str, usize) {
        (&self.name, self.params.len())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// `insert(φ)`: add φ's positive literals to the beliefs, remove its negated ones
    Insert,
    /// `delete(φ)`: the inverse of insert
    Delete,
    Adopt,
    Drop,
    /// `send(recipient, content)`
    Send,
    Print,
    Log,
    ExitModule,
    /// A call into a module; anonymous modules are nested rule blocks
    ModuleCall { anonymous: bool },
    UserSpec(Arc<ActionSpecification>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    name: String,
    params: Vec<Term>,
    kind: ActionKind,
    precondition: MentalStateCondition,
    free_vars: Vec<String>,
    source: Option<SourceInfo>,
}

impl Action {
    fn new(kind: ActionKind, name: &str, params: Vec<Term>) -> Self {
        let mut free_vars = Vec::new();
        for param in &params {
            param.collect_vars(&mut free_vars);
        }
        Self {
            name: name.to_string(),
            params,
            kind,
            precondition: MentalStateCondition::always_true(),
            free_vars,
            source: None,
        }
    }

    pub fn insert(update: &Update) -> Self {
        Self::new(ActionKind::Insert, "insert", update.to_terms())
    }

    pub fn delete(update: &Update) -> Self {
        Self::new(ActionKind::Delete, "delete", update.to_terms())
    }

    pub fn adopt(goal: Term) -> Self {
        Self::new(ActionKind::Adopt, "adopt", vec![goal])
    }

    pub fn drop_goal(goal: Term) -> Self {
        Self::new(ActionKind::Drop, "drop", vec![goal])
    }

    pub fn send(recipient: Term, content: Term) -> Self {
        Self::new(ActionKind::Send, "send", vec![recipient, content])
    }

    pub fn print(term: Term) -> Self {
        Self::new(ActionKind::Print, "print", vec![term])
    }

    pub fn log(term: Term) -> Self {
        Self::new(ActionKind::Log, "log", vec![term])
    }

    pub fn exit_module() -> Self {
        Self::new(ActionKind::ExitModule, "exit-module", Vec::new())
    }

    pub fn module_call(module: &str, args: Vec<Term>) -> Self {
        Self::new(ActionKind::ModuleCall { anonymous: false }, module, args)
    }

    pub fn anonymous_module(label: &str) -> Self {
        Self::new(ActionKind::ModuleCall { anonymous: true }, label, Vec::new())
    }

    pub fn user_spec(spec: Arc<ActionSpecification>, args: Vec<Term>) -> Self {
        let name = spec.name.clone();
        Self::new(ActionKind::UserSpec(spec), &name, args)
    }

    pub fn with_precondition(mut self, precondition: MentalStateCondition) -> Self {
        self.precondition = precondition;
        self
    }

    pub fn at(mut self, source: SourceInfo) -> Self {
        self.source = Some(source);
        self
    }

    /// Read an action from its term form, resolving user-specified actions and
    /// module calls against `library`.
    pub fn from_term(term: &Term, library: &ActionLibrary) -> ParseResult<Self> {
        let (name, args) = match term {
            Term::Atom(name) => (name.as_str(), &[][..]),
            Term::Compound { functor, args } => (functor.as_str(), args.as_slice()),
            _ => return Err(invalid(term)),
        };
        let kind = match (name, args.len()) {
            ("insert", n) if n > 0 => ActionKind::Insert,
            ("delete", n) if n > 0 => ActionKind::Delete,
            ("adopt", 1) => ActionKind::Adopt,
            ("drop", 1) => ActionKind::Drop,
            ("send", 2) => ActionKind::Send,
            ("print", 1) => ActionKind::Print,
            ("log", 1) => ActionKind::Log,
            ("exit-module", 0) => ActionKind::ExitModule,
            (name, arity) => {
                if let Some(spec) = library.spec(name, arity) {
                    ActionKind::UserSpec(spec)
                } else if library.has_module(name, arity) {
                    ActionKind::ModuleCall { anonymous: false }
                } else {
                    return Err(invalid(term));
                }
            }
        };
        Ok(Self::new(kind, name, args.to_vec()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Term] {
        &self.params
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn precondition(&self) -> &MentalStateCondition {
        &self.precondition
    }

    pub fn source(&self) -> Option<&SourceInfo> {
        self.source.as_ref()
    }

    /// Variables occurring in the parameters, in first-occurrence order.
    pub fn free_vars(&self) -> &[String] {
        &self.free_vars
    }

    pub fn is_closed(&self) -> bool {
        self.free_vars.is_empty()
    }

    pub fn signature(&self) -> (&str, usize) {
        (&self.name, self.params.len())
    }

    /// The update carried by an insert or delete action.
    pub fn update(&self) -> Update {
        Update::from_terms(&self.params)
    }

    /// Instantiate parameters and precondition.
    pub fn apply(&self, subst: &Substitution) -> Self {
        let mut action = Self::new(
            self.kind.clone(),
            &self.name,
            self.params.iter().map(|p| p.apply(subst)).collect(),
        );
        action.precondition = self.precondition.apply(subst);
        action.source = self.source.clone();
        action
    }

    /// Most general unifier of the parameters of two actions with the same signature.
    pub fn mgu(&self, other: &Action) -> Option<Substitution> {
        if self.signature() != other.signature() {
            return None;
        }
        unify_all(&self.params, &other.params)
    }

    pub fn to_term(&self) -> Term {
        Term::compound(&self.name, self.params.clone())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_term())
    }
}

fn invalid(term: &Term) -> ParseError {
    ParseError::Invalid {
        what: "action".to_string(),
        term: term.to_string(),
    }
}

/// Action specifications and module signatures an agent program declares.
#[derive(Debug, Clone, Default)]
pub struct ActionLibrary {
    specs: Vec<Arc<ActionSpecification>>,
    modules: Vec<(String, usize)>,
}

impl ActionLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_spec(&mut self, spec: ActionSpecification) -> Arc<ActionSpecification> {
        let spec = Arc::new(spec);
        self.specs.push(spec.clone());
        spec
    }

    pub fn add_module(&mut self, name: &str, arity: usize) {
        self.modules.push((name.to_string(), arity));
    }

    pub fn spec(&self, name: &str, arity: usize) -> Option<Arc<ActionSpecification>> {
        self.specs
            .iter()
            .find(|s| s.signature() == (name, arity))
            .cloned()
    }

    pub fn specs(&self) -> &[Arc<ActionSpecification>] {
        &self.specs
    }

    pub fn has_module(&self, name: &str, arity: usize) -> bool {
        self.modules.iter().any(|(n, a)| n == name && *a == arity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kr::parse_term;

    fn library() -> ActionLibrary {
        let mut lib = ActionLibrary::new();
        lib.add_spec(ActionSpecification::new(
            "move",
            vec![Term::var("X"), Term::var("Y")],
        ));
        lib.add_module("build", 1);
        lib
    }

    #[test]
    fn test_from_term_kinds() {
        let lib = library();
        let read = |s: &str| Action::from_term(&parse_term(s).unwrap(), &lib).unwrap();
        assert_eq!(read("insert(p(1), not(q))").kind(), &ActionKind::Insert);
        assert_eq!(read("exit-module").kind(), &ActionKind::ExitModule);
        assert!(matches!(read("move(a, b)").kind(), ActionKind::UserSpec(_)));
        assert_eq!(
            read("build(tower)").kind(),
            &ActionKind::ModuleCall { anonymous: false }
        );
        assert!(Action::from_term(&parse_term("fly(a)").unwrap(), &lib).is_err());
        assert!(Action::from_term(&parse_term("move(a)").unwrap(), &lib).is_err());
    }

    #[test]
    fn test_free_vars_and_closedness() {
        let a = Action::send(Term::var("R"), parse_term("p(X, R)").unwrap());
        assert_eq!(a.free_vars(), &["R".to_string(), "X".to_string()]);
        assert!(!a.is_closed());

        let s = Substitution::singleton("R", Term::atom("bob"))
            .combine(&Substitution::singleton("X", Term::Int(2)))
            .unwrap();
        let ground = a.apply(&s);
        assert!(ground.is_closed());
        assert_eq!(ground.to_string(), "send(bob, p(2, bob))");
    }

    #[test]
    fn test_mgu() {
        let a = Action::adopt(parse_term("on(X, table)").unwrap());
        let b = Action::adopt(parse_term("on(b1, Y)").unwrap());
        let mgu = a.mgu(&b).unwrap();
        assert_eq!(mgu.get("X"), Some(&Term::atom("b1")));
        assert_eq!(mgu.get("Y"), Some(&Term::atom("table")));

        let ground = Action::print(Term::atom("hi"));
        assert!(ground.mgu(&ground).unwrap().is_empty());
        assert!(ground.mgu(&Action::log(Term::atom("hi"))).is_none());
    }

    #[test]
    fn test_mood_of_content() {
        let content = parse_term("interrogative(p(X))").unwrap();
        let (mood, inner) = Mood::of(&content);
        assert_eq!(mood, Mood::Interrogative);
        assert_eq!(inner.signature(), Some(("p", 1)));
        assert_eq!(Mood::of(&Term::atom("p")).0, Mood::Indicative);
    }
}
