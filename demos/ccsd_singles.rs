use wickenso::Session;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut pq = Session::new("fermi")?;
    pq.set_bra("singles")?;
    pq.set_print_level(0);

    println!();
    println!("    < 0 | m* e e(-T) H e(T) | 0> :");
    println!();

    // one-electron part: need only up to double commutators

    // f
    pq.add_operator_product(1.0, &["f"])?;
    // [f, T1]
    pq.add_commutator(1.0, &["f"], &["t1"])?;
    // [f, T2]
    pq.add_commutator(1.0, &["f"], &["t2"])?;
    // [[f, T1], T1]
    pq.add_double_commutator(0.5, &["f"], &["t1"], &["t1"])?;
    // [[f, T1], T2] + [[f, T2], T1]
    pq.add_double_commutator(1.0, &["f"], &["t1"], &["t2"])?;
    // [[f, T2], T2]
    pq.add_double_commutator(0.5, &["f"], &["t2"], &["t2"])?;

    // two-electron part: need up to quadruple commutators

    // v
    pq.add_operator_product(1.0, &["v"])?;
    // [v, T1]
    pq.add_commutator(1.0, &["v"], &["t1"])?;
    // [v, T2]
    pq.add_commutator(1.0, &["v"], &["t2"])?;
    // [[v, T1], T1]
    pq.add_double_commutator(0.5, &["v"], &["t1"], &["t1"])?;
    // [[v, T1], T2] + [[v, T2], T1]
    pq.add_double_commutator(1.0, &["v"], &["t1"], &["t2"])?;
    // [[v, T2], T2]
    pq.add_double_commutator(0.5, &["v"], &["t2"], &["t2"])?;
    // [[[v, T1], T1], T1]
    pq.add_triple_commutator(1.0 / 6.0, &["v"], &["t1"], &["t1"], &["t1"])?;
    // [[[v, T1], T1], T2] and its two reorderings
    pq.add_triple_commutator(1.0 / 2.0, &["v"], &["t1"], &["t1"], &["t2"])?;
    // [[[[v, T1], T1], T1], T1]
    pq.add_quadruple_commutator(1.0 / 24.0, &["v"], &["t1"], &["t1"], &["t1"], &["t1"])?;

    pq.simplify()?;
    pq.print_fully_contracted()?;

    pq.clear();
    Ok(())
}
