mod common;

use classfold::bytecode::opcodes::{IRETURN, NOP, RETURN};
use classfold::bytecode::{ArithOp, LiteralPool, MethodCode, Relation};
use classfold::{optimize, Config};
use common::*;

fn run(code: &MethodCode, config: &Config) -> MethodCode {
    optimize(code, &print_pool(), config).unwrap().code
}

#[test]
fn nested_int_expression_folds_to_single_constant() {
    // return 7 + 3 * 2
    let code = MethodCode::new(vec![int(7), int(3), int(2), arith(ArithOp::Mul), arith(ArithOp::Add), other(IRETURN)])
        .with_limits(3, 0, 0);
    let optimized = optimize(&code, &LiteralPool::new(), &Config::default()).unwrap();
    assert!(optimized.changed);
    assert_eq!(optimized.code.instructions, vec![int(13), other(IRETURN)]);
    assert_eq!(optimized.code.max_stack, 1);
    assert_eq!(optimized.stats.fold.folded, 2);
}

fn store_then_print() -> MethodCode {
    // int x = 5; System.out.println(x);
    MethodCode::new(vec![int(5), store(0), get_out(), load(0), println(), other(RETURN)]).with_limits(2, 1, 0)
}

#[test]
fn stored_constant_propagates_into_print() {
    let folded = run(&store_then_print(), &Config::new().with_dead_store_elimination(false));
    assert_eq!(folded.instructions, vec![int(5), store(0), get_out(), int(5), println(), other(RETURN)]);
}

#[test]
fn unread_store_removed_after_propagation() {
    let optimized = optimize(&store_then_print(), &print_pool(), &Config::default()).unwrap();
    assert_eq!(optimized.code.instructions, vec![get_out(), int(5), println(), other(RETURN)]);
    assert_eq!(optimized.stats.dead_stores.stores_removed, 1);
    assert_eq!(optimized.code.max_locals, 0);
    assert_eq!(optimized.code.max_stack, 2);
    assert_eq!(execute(&optimized.code, &[]), execute(&store_then_print(), &[]));
}

#[test]
fn always_true_condition_keeps_only_then_arm() {
    // if (2 > 1) println(1) else println(2)
    let code = MethodCode::new(vec![
        int(2),
        int(1),
        if_icmp(Relation::Le, 7),
        get_out(),
        int(1),
        println(),
        goto(10),
        get_out(),
        int(2),
        println(),
        other(RETURN),
    ]);
    let optimized = optimize(&code, &print_pool(), &Config::default()).unwrap();
    assert_eq!(optimized.code.instructions, vec![get_out(), int(1), println(), other(RETURN)]);
    assert_eq!(optimized.stats.fold.branches_pruned, 1);
    assert_eq!(execute(&optimized.code, &[]), Outcome::Returned { value: None, printed: vec![1] });
}

#[test]
fn always_false_condition_drops_then_arm() {
    // if (1 > 2) println(1); println(2)
    let code = MethodCode::new(vec![
        int(1),
        int(2),
        if_icmp(Relation::Le, 6),
        get_out(),
        int(1),
        println(),
        get_out(),
        int(2),
        println(),
        other(RETURN),
    ]);
    let optimized = run(&code, &Config::default());
    assert_eq!(optimized.instructions, vec![get_out(), int(2), println(), other(RETURN)]);
}

fn summing_loop() -> MethodCode {
    // static int sum(int n) { int x = 0; for (int i = 0; i < n; i++) { x = x + i; } return x; }
    MethodCode::new(vec![
        int(0),
        store(1),
        int(0),
        store(2),
        load(2),
        load(0),
        if_icmp(Relation::Ge, 13),
        load(1),
        load(2),
        arith(ArithOp::Add),
        store(1),
        iinc(2, 1),
        goto(4),
        load(1),
        other(IRETURN),
    ])
    .with_limits(2, 3, 1)
}

#[test]
fn loop_accumulator_is_not_folded() {
    let code = summing_loop();
    let optimized = optimize(&code, &LiteralPool::new(), &Config::default()).unwrap();
    assert_eq!(optimized.code.instructions[13], load(1));
    assert_eq!(optimized.code.instructions[9], arith(ArithOp::Add));
    for n in [0, 1, 4, 10] {
        assert_eq!(execute(&optimized.code, &[n]), execute(&code, &[n]));
    }
    assert_eq!(execute(&optimized.code, &[4]), Outcome::Returned { value: Some(6), printed: vec![] });
}

#[test]
fn division_by_computed_zero_stays_and_traps() {
    // return 10 / (5 - 5)
    let code = MethodCode::new(vec![int(10), int(5), int(5), arith(ArithOp::Sub), arith(ArithOp::Div), other(IRETURN)]);
    let optimized = optimize(&code, &LiteralPool::new(), &Config::default()).unwrap();
    assert_eq!(optimized.code.instructions, vec![int(10), int(0), arith(ArithOp::Div), other(IRETURN)]);
    assert_eq!(optimized.stats.fold.skipped, 1);
    assert!(matches!(execute(&optimized.code, &[]), Outcome::Trapped { .. }));
}

#[test]
fn else_arm_entered_from_elsewhere_is_kept() {
    // the else arm is also the target of an earlier branch
    let code = MethodCode::new(vec![
        load(0),
        if_zero(Relation::Ne, 8),
        int(2),
        int(1),
        if_icmp(Relation::Le, 7),
        int(1),
        goto(9),
        other(NOP),
        int(2),
        other(IRETURN),
    ])
    .with_limits(2, 1, 1);
    let optimized = optimize(&code, &LiteralPool::new(), &Config::default()).unwrap();
    assert!(optimized.stats.fold.skipped >= 1);
    assert!(optimized.code.instructions.contains(&int(2)));
    for arg in [0, 1] {
        assert_eq!(execute(&optimized.code, &[arg]), execute(&code, &[arg]));
    }
}
