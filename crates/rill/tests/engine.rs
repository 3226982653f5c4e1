//! End-to-end scenarios across the server session and the client runtime.

use rill::{
    AnimatedConfig, AnimationPhase, ClientRuntime, ComponentSpec, ConfirmOutcome, FieldDef,
    FieldType, KeyedResult, Lifetime, PhaseMachine, PushOutcome, Session, Snapshot, Value,
};
use std::sync::Arc;
use std::time::Duration;
use ulid::Ulid;

fn counter_component() -> Arc<rill::Component> {
    Arc::new(
        ComponentSpec::new("counter")
            .field(
                FieldDef::new("count", FieldType::Primitive, Value::number(1.0))
                    .lifetime(Lifetime::Shareable)
                    .optimistic(),
            )
            .derive_optimistic("doubled", "count * 2")
            .derive_optimistic("quadrupled", "doubled * 2")
            .build()
            .unwrap(),
    )
}

#[test]
fn derivation_chain_recomputes_in_one_pass() {
    // count=1 -> doubled=2, quadrupled=4; one apply recomputes both in order.
    let mut session = Session::new_inline(counter_component());
    let projection = session.hydrate(&Snapshot::new());
    assert_eq!(projection["doubled"], Value::number(2.0));
    assert_eq!(projection["quadrupled"], Value::number(4.0));

    let changed = session.apply(Snapshot::from([(Arc::from("count"), Value::number(3.0))]));
    assert_eq!(changed["doubled"], Value::number(6.0));
    assert_eq!(changed["quadrupled"], Value::number(12.0));
}

#[test]
fn optimistic_round_trip_client_and_server_agree() {
    let component = counter_component();
    let mut session = Session::new_inline(component.clone());
    session.hydrate(&Snapshot::new());
    let mut client = ClientRuntime::new(component, Ulid::new());

    // client mutates optimistically and computes its mirror immediately
    let outcome = client.local_mutate("count", Value::number(5.0));
    assert_eq!(outcome.changed["doubled"], Value::number(10.0));
    assert_eq!(outcome.changed["quadrupled"], Value::number(20.0));
    let request = outcome.request.unwrap();

    // server applies the same mutation and confirms
    let changed = session.apply(Snapshot::from([(
        request.field.clone(),
        request.value.clone(),
    )]));
    assert_eq!(changed["doubled"], client.value("doubled").unwrap());
    assert_eq!(changed["quadrupled"], client.value("quadrupled").unwrap());

    let (outcome, _) = client.confirm_from_server(
        request.field.clone(),
        session.value("count").unwrap().clone(),
        request.version,
    );
    assert_eq!(outcome, ConfirmOutcome::Applied);
    assert!(!client.cell("count").unwrap().is_pending());
}

#[test]
fn stale_confirmation_never_wins_over_newer_mutation() {
    // LocalMutate(5) -> v1; LocalMutate(7) -> v2; reply for v1 rejected.
    let mut client = ClientRuntime::new(counter_component(), Ulid::new());
    client.local_mutate("count", Value::number(5.0));
    client.local_mutate("count", Value::number(7.0));

    let (outcome, _) = client.confirm_from_server("count", Value::number(5.0), 1);
    assert_eq!(outcome, ConfirmOutcome::Stale);
    assert_eq!(client.value("count"), Some(Value::number(7.0)));
    assert!(client.cell("count").unwrap().is_pending());
}

#[test]
fn push_suppressed_while_pending_accepted_after_confirmation() {
    let mut client = ClientRuntime::new(counter_component(), Ulid::new());
    client.local_mutate("count", Value::number(5.0));

    let (outcome, _) = client.server_push("count", Value::number(42.0));
    assert_eq!(outcome, PushOutcome::DroppedPending);

    client.confirm_from_server("count", Value::number(5.0), 1);
    let (outcome, changed) = client.server_push("count", Value::number(42.0));
    assert_eq!(outcome, PushOutcome::Applied);
    assert_eq!(changed["doubled"], Value::number(84.0));
}

#[test]
fn keyed_cart_decrement_removes_last_item() {
    // [{id:1, qty:1}] + decrement(id:1) with remove-at-qty<=1 -> []
    let component = Arc::new(
        ComponentSpec::new("cart")
            .field(
                FieldDef::new(
                    "items",
                    FieldType::Array,
                    Value::list([Value::record([
                        ("id", Value::number(1.0)),
                        ("qty", Value::number(1.0)),
                    ])]),
                )
                .optimistic(),
            )
            .derive_optimistic("item_count", "length(items)")
            .build()
            .unwrap(),
    );
    let mut client = ClientRuntime::new(component, Ulid::new());
    let outcome = client.mutate_keyed("items", "id", &Value::number(1.0), |item| {
        let qty = item
            .get_field("qty")
            .and_then(Value::as_number)
            .unwrap_or(0.0);
        if qty <= 1.0 {
            KeyedResult::Remove
        } else {
            KeyedResult::Update(item.with_field("qty", Value::number(qty - 1.0)))
        }
    });
    assert_eq!(outcome.changed["items"], Value::list([]));
    assert_eq!(outcome.changed["item_count"], Value::number(0.0));
}

#[test]
fn animated_modal_walks_the_phase_table() {
    // idle -(open)-> entering -(TransitionEnd, async not ready)-> loading
    // -(AsyncReady)-> visible -(close)-> exiting -(timer)-> idle
    let config = AnimatedConfig::new(Duration::from_millis(200), Duration::from_millis(120))
        .with_async_content();
    let mut machine = PhaseMachine::new(config);

    machine.on_presence(true);
    assert_eq!(machine.phase(), AnimationPhase::Entering);
    machine.on_transition_end();
    assert_eq!(machine.phase(), AnimationPhase::Loading);
    machine.on_async_ready();
    assert_eq!(machine.phase(), AnimationPhase::Visible);
    machine.on_presence(false);
    assert_eq!(machine.phase(), AnimationPhase::Exiting);
    machine.on_exit_timer();
    assert_eq!(machine.phase(), AnimationPhase::Idle);
}

#[test]
fn untranspilable_derivation_stays_server_authoritative() {
    let component = Arc::new(
        ComponentSpec::new("invoice")
            .field(
                FieldDef::new("price", FieldType::Primitive, Value::number(9.99)).optimistic(),
            )
            .derive_optimistic("with_tax", "decimal(price * 1.21)")
            .build()
            .unwrap(),
    );
    // demoted: a diagnostic marker exists and the client never mirrors it
    assert_eq!(component.diagnostics().server_only.len(), 1);
    let client = ClientRuntime::new(component.clone(), Ulid::new());
    assert_eq!(client.value("with_tax"), None);

    // the server still evaluates it
    let mut session = Session::new_inline(component);
    let projection = session.hydrate(&Snapshot::new());
    assert_eq!(projection["with_tax"], Value::number(12.09));
}

/// One entry per supported operator: the server result and the emitted
/// client fragment, checked against the same snapshot.
#[test]
fn transpile_corpus_covers_every_operator() {
    let snapshot = Snapshot::from([
        (Arc::from("a"), Value::number(6.0)),
        (Arc::from("b"), Value::number(4.0)),
        (Arc::from("name"), Value::text("ada")),
        (
            Arc::from("user"),
            Value::record([("age", Value::number(30.0))]),
        ),
        (Arc::from("nothing"), Value::Unit),
        (
            Arc::from("xs"),
            Value::list([Value::number(1.0), Value::number(2.0), Value::number(3.0)]),
        ),
    ]);

    let corpus: &[(&str, Value, &str)] = &[
        ("a + b", Value::number(10.0), "__rt.add(($.a), ($.b))"),
        ("a - b", Value::number(2.0), "($.a) - ($.b)"),
        ("a * b", Value::number(24.0), "($.a) * ($.b)"),
        ("a / b", Value::number(1.5), "($.a) / ($.b)"),
        ("-a", Value::number(-6.0), "-($.a)"),
        ("a == b", Value::bool(false), "__rt.eq(($.a), ($.b))"),
        ("a != b", Value::bool(true), "!__rt.eq(($.a), ($.b))"),
        ("a > b", Value::bool(true), "($.a) > ($.b)"),
        ("a >= b", Value::bool(true), "($.a) >= ($.b)"),
        ("a < b", Value::bool(false), "($.a) < ($.b)"),
        ("a <= b", Value::bool(false), "($.a) <= ($.b)"),
        ("a && b", Value::number(4.0), "($.a) && ($.b)"),
        ("a || b", Value::number(6.0), "($.a) || ($.b)"),
        ("!a", Value::bool(false), "!($.a)"),
        (
            "'hi ' + name",
            Value::text("hi ada"),
            "__rt.add(('hi '), ($.name))",
        ),
        // Mixed-type addition uses the server's display form on both
        // sides of the wire, not the host's coercion rules.
        (
            "'n: ' + xs",
            Value::text("n: [1,2,3]"),
            "__rt.add(('n: '), ($.xs))",
        ),
        (
            "'' + user",
            Value::text("{age:30}"),
            "__rt.add((''), ($.user))",
        ),
        ("name + a", Value::text("ada6"), "__rt.add(($.name), ($.a))"),
        ("user.age", Value::number(30.0), "($.user).age"),
        ("nothing?.age", Value::Unit, "($.nothing)?.age"),
        (
            "if a > b then 'yes' else 'no'",
            Value::text("yes"),
            "(($.a) > ($.b)) ? ('yes') : ('no')",
        ),
        ("length(xs)", Value::number(3.0), "__rt.length($.xs)"),
        ("sum(xs)", Value::number(6.0), "__rt.sum($.xs)"),
        (
            "join(xs, '-')",
            Value::text("1-2-3"),
            "($.xs).join('-')",
        ),
        (
            "map(xs, x -> x * 2)",
            Value::list([Value::number(2.0), Value::number(4.0), Value::number(6.0)]),
            "($.xs).map((x) => ((x) * (2)))",
        ),
        (
            "filter(xs, x -> x > 1)",
            Value::list([Value::number(2.0), Value::number(3.0)]),
            "($.xs).filter((x) => ((x) > (1)))",
        ),
        (
            "reject(xs, x -> x > 1)",
            Value::list([Value::number(1.0)]),
            "($.xs).filter((x) => !((x) > (1)))",
        ),
        ("blank(name)", Value::bool(false), "__rt.blank($.name)"),
        ("blank(nothing)", Value::bool(true), "__rt.blank($.nothing)"),
    ];

    for (source, expected, expected_client) in corpus {
        let compiled = rill::compile(source).unwrap();
        assert_eq!(
            compiled.evaluate(&snapshot).unwrap(),
            *expected,
            "server eval of `{source}`"
        );
        assert_eq!(
            compiled.client_source().unwrap(),
            *expected_client,
            "client emission of `{source}`"
        );
    }
}
