#[macro_use]
extern crate clap;
use clap::Arg;
use colored::Colorize;
use console::style;

use aeg_spectre::aeg::Aeg;
use aeg_spectre::alias::ConservativeOracle;
use aeg_spectre::cfg::Cfg2;
use aeg_spectre::dataflow::{AddressDependencyAnalysis, BinaryInstRel, DataDependencyAnalysis};
use aeg_spectre::detector::spectre_v4::SpectreV4;
use aeg_spectre::detector::Leakage;
use aeg_spectre::environment::{CheckMode, Environment, SolverKind, TaintStrategy};
use aeg_spectre::error::Result;
use aeg_spectre::expanded::CfgExpanded;
use aeg_spectre::loader;
use aeg_spectre::monitor::{Client, Function, Message};
use aeg_spectre::pool::Pool;
use aeg_spectre::solver::{create_solver, Solver};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    let arguments = parse_arguments();
    if let Err(e) = run(&arguments) {
        println!("{}", style(&e.to_string()).bold().red());
        process::exit(1);
    }
}

struct Arguments {
    input_file: String,
    environment_file: Option<String>,
    output_dir: Option<String>,
    function: Option<String>,
    num_specs: Option<usize>,
    rob_size: Option<usize>,
    check_mode: Option<CheckMode>,
    solver: Option<SolverKind>,
    taint_strategy: Option<TaintStrategy>,
    batch_mode: bool,
    witness_executions: bool,
    concrete_sourced_stores: bool,
    monitor_socket: Option<String>,
    jobs: Option<usize>,
    debug: bool,
}

fn is_positive_number(s: String) -> std::result::Result<(), String> {
    if s.parse::<usize>().is_ok() {
        Ok(())
    } else {
        Err(format!("{} isn't a positive number", s))
    }
}

fn parse_arguments() -> Arguments {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("input_file")
                .value_name("FILE")
                .help("Module file to be checked (YAML)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("environment_file")
                .short("e")
                .long("env")
                .value_name("FILE")
                .help("Sets environment file to use (arguments overwrite it)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("output_dir")
                .short("o")
                .long("output-dir")
                .value_name("DIR")
                .help("Sets the directory leakage.txt/transmitters.txt/witnesses are written to")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("function")
                .long("function")
                .value_name("NAME")
                .help("Restricts analysis to a single function")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("num_specs")
                .long("num-specs")
                .value_name("N")
                .help("Sets the mis-speculation unrolling depth")
                .validator(is_positive_number)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("rob_size")
                .long("rob-size")
                .value_name("N")
                .help("Sets the reorder-buffer size")
                .validator(is_positive_number)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("check_mode")
                .long("check-mode")
                .value_name("MODE")
                .possible_values(&["fast", "slow"])
                .help("Sets the traceback mode")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("solver")
                .long("solver")
                .value_name("SOLVER")
                .possible_values(&["z3", "cvc4", "yices2"])
                .help("Sets solver to use")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("taint_strategy")
                .long("taint-strategy")
                .value_name("STRATEGY")
                .possible_values(&["bit-vector", "array"])
                .help("Sets the taint-tracking strategy")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("batch_mode")
                .long("batch-mode")
                .help("Keeps at most one leak witness per function"),
        )
        .arg(
            Arg::with_name("witness_executions")
                .long("witness-executions")
                .help("Dumps a .dot witness graph for every leak found"),
        )
        .arg(
            Arg::with_name("concrete_sourced_stores")
                .long("concrete-sourced-stores")
                .help("Enumerates concrete bypassed/sourced store pairs instead of the default disjunction"),
        )
        .arg(
            Arg::with_name("monitor_socket")
                .long("monitor")
                .value_name("PATH")
                .help("Unix-domain socket of a running aeg-spectre-monitor to report progress to")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("jobs")
                .short("j")
                .long("jobs")
                .value_name("N")
                .help("Maximum number of functions analyzed in parallel")
                .validator(is_positive_number)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("debug")
                .short("d")
                .long("debug")
                .help("Enables debug mode"),
        )
        .get_matches();

    let parse_check_mode = |mode: &str| match mode {
        "fast" => CheckMode::Fast,
        "slow" => CheckMode::Slow,
        _ => panic!("unknown check mode"),
    };

    let parse_solver = |solver: &str| match solver {
        "z3" => SolverKind::Z3,
        "cvc4" => SolverKind::CVC4,
        "yices2" => SolverKind::Yices2,
        _ => panic!("unknown solver"),
    };

    let parse_taint_strategy = |strategy: &str| match strategy {
        "bit-vector" => TaintStrategy::BitVector,
        "array" => TaintStrategy::Array,
        _ => panic!("unknown taint strategy"),
    };

    Arguments {
        input_file: matches.value_of("input_file").map(String::from).unwrap(),
        environment_file: matches.value_of("environment_file").map(String::from),
        output_dir: matches.value_of("output_dir").map(String::from),
        function: matches.value_of("function").map(String::from),
        num_specs: matches.value_of("num_specs").map(|v| v.parse().unwrap()),
        rob_size: matches.value_of("rob_size").map(|v| v.parse().unwrap()),
        check_mode: matches.value_of("check_mode").map(parse_check_mode),
        solver: matches.value_of("solver").map(parse_solver),
        taint_strategy: matches.value_of("taint_strategy").map(parse_taint_strategy),
        batch_mode: matches.is_present("batch_mode"),
        witness_executions: matches.is_present("witness_executions"),
        concrete_sourced_stores: matches.is_present("concrete_sourced_stores"),
        monitor_socket: matches.value_of("monitor_socket").map(String::from),
        jobs: matches.value_of("jobs").map(|v| v.parse().unwrap()),
        debug: matches.is_present("debug"),
    }
}

fn build_environment(arguments: &Arguments) -> Result<Environment> {
    let mut env = if let Some(file_path) = &arguments.environment_file {
        Environment::from_file(Path::new(file_path))?
    } else {
        let input_file = Path::new(&arguments.input_file);
        let env_file = input_file.with_extension("yaml");
        match Environment::from_file(&env_file) {
            Ok(env) => {
                println!(
                    "Using environment defined in '{}'.",
                    style(env_file.to_string_lossy()).yellow()
                );
                env
            }
            Err(_) => {
                println!("Using default environment.");
                Environment::default()
            }
        }
    };

    if let Some(output_dir) = &arguments.output_dir {
        env.output_dir = PathBuf::from(output_dir);
    }
    if let Some(num_specs) = arguments.num_specs {
        env.num_specs = num_specs;
    }
    if let Some(rob_size) = arguments.rob_size {
        env.rob_size = rob_size;
    }
    if let Some(check_mode) = arguments.check_mode {
        env.check_mode = check_mode;
    }
    if let Some(solver) = arguments.solver {
        env.set_solver(solver);
    }
    if let Some(taint_strategy) = arguments.taint_strategy {
        env.taint_strategy = taint_strategy;
    }
    if arguments.batch_mode {
        env.batch_mode = true;
    }
    if arguments.witness_executions {
        env.witness_executions = true;
    }
    if arguments.concrete_sourced_stores {
        env.spectre_v4_mode.concrete_sourced_stores = true;
    }

    Ok(env)
}

fn run(arguments: &Arguments) -> Result<()> {
    let env = build_environment(arguments)?;

    if arguments.debug {
        println!("{}:\n{}\n---", style("Environment").bold(), style(&env).cyan());
    }

    std::fs::create_dir_all(&env.output_dir)?;

    println!(
        "{} Load module '{}'",
        style("[1/3]").bold().dim(),
        style(&arguments.input_file).yellow()
    );
    let module = loader::load_file(Path::new(&arguments.input_file))?;

    let names: Vec<String> = match &arguments.function {
        Some(name) => {
            if module.function(name).is_none() {
                return Err(format!("no such function '{}'", name).into());
            }
            vec![name.clone()]
        }
        None => module.functions().map(|(name, _)| name.clone()).collect(),
    };

    println!(
        "{} Analyze {} function(s)",
        style("[2/3]").bold().dim(),
        names.len()
    );

    let leakage_path = env.output_dir.join("leakage.txt");
    let transmitters_path = env.output_dir.join("transmitters.txt");
    let _ = std::fs::remove_file(&leakage_path);
    let _ = std::fs::remove_file(&transmitters_path);

    let mut monitor = connect_monitor_at(&arguments.monitor_socket);
    monitor.send_lossy(&Message::FunctionsAnalyzed {
        functions: names
            .iter()
            .map(|name| Function::new(name.clone(), None))
            .collect(),
    });

    let jobs = arguments.jobs.unwrap_or(1);
    let monitor_socket = arguments.monitor_socket.clone();
    let worker_env = env.clone();
    let pool = Pool::new(jobs);

    pool.run(names, move |name: &String| {
        let cfg = module
            .function(name)
            .expect("function name list was built from this module");
        let mut monitor = connect_monitor_at(&monitor_socket);
        monitor.send_lossy(&Message::FunctionStarted {
            function: Function::new(name.clone(), None),
        });

        match analyze_function(name, cfg, &worker_env) {
            Ok(found_leak) => {
                monitor.send_lossy(&Message::FunctionCompleted {
                    function: Function::new(name.clone(), None),
                });
                if found_leak {
                    println!("{} {}: {}", style("[!]").bold().red(), name, "leak detected");
                } else {
                    println!("{} {}: {}", style("[ok]").bold().green(), name, "no leak found");
                }
            }
            Err(e) => {
                monitor.send_lossy(&Message::FunctionCompleted {
                    function: Function::new(name.clone(), None),
                });
                eprintln!("{} {}: {}", style("[err]").bold().red(), name, e);
            }
        }
    })?;

    println!("{} Done, see '{}'", style("[3/3]").bold().dim(), env.output_dir.display());

    let leak_found = std::fs::metadata(&leakage_path).map(|m| m.len() > 0).unwrap_or(false);
    if leak_found {
        println!("{}", "Leak(s) detected, see leakage.txt".bold().red());
        process::exit(2);
    }
    println!("{}", "No leaks found.".bold().green());

    Ok(())
}

fn connect_monitor_at(socket: &Option<String>) -> Client {
    match socket {
        Some(path) => Client::connect(path).unwrap_or_else(|e| {
            eprintln!("warning: could not connect to monitor at '{}': {}", path, e);
            Client::disconnected()
        }),
        None => Client::disconnected(),
    }
}

/// Runs the full per-function pipeline, returning whether any leak was found.
fn analyze_function(name: &str, cfg: &Cfg2, env: &Environment) -> Result<bool> {
    let expanded = CfgExpanded::construct(cfg, env.num_specs, env.rob_size)?;

    let addr_rel = AddressDependencyAnalysis::default().get_result(cfg)?;
    let data_rel = DataDependencyAnalysis::default().get_result(cfg)?;
    let ctrl_rel = BinaryInstRel::new();

    let aeg = Aeg::construct(
        &expanded,
        cfg,
        &addr_rel,
        &data_rel,
        &ctrl_rel,
        &ConservativeOracle,
        env,
    )?;

    let mut solver = create_solver(env)?;
    declare_variables(solver.as_mut(), cfg, &aeg)?;
    aeg.constraints().add_to(solver.as_mut())?;

    let mut detector = SpectreV4::new(&aeg, solver.as_mut(), env);
    detector.run()?;

    write_reports(name, &aeg, &expanded, cfg, detector.leaks(), env)?;

    Ok(!detector.leaks().is_empty())
}

/// Declares every free symbol a later `assert` could reference: the
/// instructions' own variables (addresses, stored values, branch
/// conditions, ...) plus each AEG node's fresh arch/trans/exec/addr/data/
/// order symbols.
fn declare_variables(solver: &mut dyn Solver, cfg: &Cfg2, aeg: &Aeg) -> Result<()> {
    let mut seen = HashSet::new();
    for (_, instruction) in cfg.nodes() {
        for variable in instruction
            .variables_read()
            .into_iter()
            .chain(instruction.variables_written())
        {
            if seen.insert(variable.clone()) {
                solver.declare(variable)?;
            }
        }
    }

    for (_, node) in aeg.nodes() {
        solver.declare(node.arch_variable())?;
        solver.declare(node.trans_variable())?;
        solver.declare(node.exec_variable())?;
        solver.declare(node.arch_order_variable())?;
        solver.declare(node.xsaccess_order_variable())?;
        if let Some(addr) = node.addr_variable() {
            solver.declare(addr)?;
        }
        if let Some(data) = node.data_variable() {
            solver.declare(data)?;
        }
    }

    Ok(())
}

fn write_reports(
    name: &str,
    aeg: &Aeg,
    expanded: &CfgExpanded,
    cfg: &Cfg2,
    leaks: &[aeg_spectre::detector::Leakage],
    env: &Environment,
) -> Result<()> {
    let leakage_path = env.output_dir.join("leakage.txt");
    let mut leakage_file = OpenOptions::new().create(true).append(true).open(&leakage_path)?;
    for leak in leaks {
        writeln!(leakage_file, "{}: {}", name, leak.print_long(aeg, expanded, cfg)?)?;
    }

    let transmitters_path = env.output_dir.join("transmitters.txt");
    let mut transmitters_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&transmitters_path)?;
    let mut transmitters: Vec<String> = Vec::with_capacity(leaks.len());
    for leak in leaks {
        transmitters.push(aeg.instruction_for(leak.transmitter, expanded, cfg)?.to_string());
    }
    transmitters.sort();
    transmitters.dedup();
    for transmitter in transmitters {
        writeln!(transmitters_file, "{}: {}", name, transmitter)?;
    }

    if env.witness_executions {
        for leak in leaks {
            let file_name = leak.witness_file_name(name);
            leak.render_witness(aeg, &env.output_dir.join(file_name))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeg_spectre::instr::Instruction;

    fn straight_line_victim() -> Cfg2 {
        use aeg_spectre::expr::{BitVector, Expression, Sort, Variable};

        let mut cfg = Cfg2::new();
        let p = Variable::new("p", Sort::word());
        let r = Variable::new("r", Sort::word());

        let store0 = cfg.add_instruction(Instruction::store(
            Expression::variable(p.clone()),
            BitVector::word_constant(0),
        ));
        let store1 = cfg.add_instruction(Instruction::store(
            Expression::variable(p.clone()),
            BitVector::word_constant(1),
        ));
        let load_r = cfg.add_instruction(Instruction::load(r.clone(), Expression::variable(p)));
        let load_s = cfg.add_instruction(Instruction::load(
            Variable::new("s", Sort::word()),
            Expression::variable(r),
        ));

        cfg.unconditional_edge(store0, store1);
        cfg.unconditional_edge(store1, load_r);
        cfg.unconditional_edge(load_r, load_s);
        cfg.set_entry(store0);
        cfg.add_exit(load_s);
        cfg
    }

    // S2: the classic speculative store-bypass shape (two stores to the same
    // address, a load of it, then a load of the loaded value) is driven end
    // to end through the real pipeline without panicking and produces a
    // well-formed AEG with the expected node count.
    #[test]
    fn analyze_pipeline_constructs_an_aeg_for_the_classic_shape() {
        let cfg = straight_line_victim();
        let env = Environment::default();
        let expanded = CfgExpanded::construct(&cfg, env.num_specs, env.rob_size).unwrap();
        let addr_rel = AddressDependencyAnalysis::default().get_result(&cfg).unwrap();
        let data_rel = DataDependencyAnalysis::default().get_result(&cfg).unwrap();
        let ctrl_rel = BinaryInstRel::new();

        let aeg = Aeg::construct(
            &expanded,
            &cfg,
            &addr_rel,
            &data_rel,
            &ctrl_rel,
            &ConservativeOracle,
            &env,
        )
        .unwrap();

        assert!(aeg.nodes().count() >= cfg.nodes().count());
        assert!(aeg.entry().is_ok());
    }

    #[test]
    fn declare_variables_declares_every_instruction_operand_once() {
        struct CountingSolver {
            declared: Vec<String>,
        }

        impl aeg_spectre::solver::DumpFormula for CountingSolver {
            fn dump_formula_to_file(&self, _path: &Path) -> Result<()> {
                Ok(())
            }
        }

        impl Solver for CountingSolver {
            fn declare(&mut self, variable: &aeg_spectre::expr::Variable) -> Result<()> {
                self.declared.push(variable.name().to_owned());
                Ok(())
            }
            fn define(
                &mut self,
                _variable: &aeg_spectre::expr::Variable,
                _expr: &aeg_spectre::expr::Expression,
            ) -> Result<()> {
                Ok(())
            }
            fn assert(&mut self, _expr: &aeg_spectre::expr::Expression) -> Result<()> {
                Ok(())
            }
            fn push(&mut self) -> Result<()> {
                Ok(())
            }
            fn pop(&mut self) -> Result<()> {
                Ok(())
            }
            fn check_sat_with_timeout(
                &mut self,
                _timeout: std::time::Duration,
            ) -> Result<aeg_spectre::solver::CheckResult> {
                Ok(aeg_spectre::solver::CheckResult::Unsat)
            }
        }

        let cfg = straight_line_victim();
        let env = Environment::default();
        let expanded = CfgExpanded::construct(&cfg, env.num_specs, env.rob_size).unwrap();
        let addr_rel = AddressDependencyAnalysis::default().get_result(&cfg).unwrap();
        let data_rel = DataDependencyAnalysis::default().get_result(&cfg).unwrap();
        let ctrl_rel = BinaryInstRel::new();
        let aeg = Aeg::construct(
            &expanded,
            &cfg,
            &addr_rel,
            &data_rel,
            &ctrl_rel,
            &ConservativeOracle,
            &env,
        )
        .unwrap();

        let mut solver = CountingSolver { declared: Vec::new() };
        declare_variables(&mut solver, &cfg, &aeg).unwrap();

        // "p" (shared store/load address) is declared exactly once even
        // though it's read by three instructions.
        assert_eq!(solver.declared.iter().filter(|n| n.as_str() == "p").count(), 1);
        assert!(!solver.declared.is_empty());
    }
}
