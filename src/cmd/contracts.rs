//! Contract table listing: `appforge contracts`.

use anyhow::{Context, Result, bail};
use console::style;

use appforge::contract::{AgentContract, ArtifactRequirement, ContractRegistry};

pub fn cmd_contracts(agent: Option<&str>, json: bool) -> Result<()> {
    let registry = ContractRegistry::builtin();

    let contracts: Vec<&AgentContract> = match agent {
        Some(id) => match registry.contract(id) {
            Some(contract) => vec![contract],
            None => {
                let known: Vec<&str> = registry.contracts().map(|c| c.agent_id.as_str()).collect();
                bail!("Unknown agent '{}'. Known agents: {}", id, known.join(", "));
            }
        },
        None => registry.contracts().collect(),
    };

    if json {
        let out = serde_json::to_string_pretty(&contracts).context("Failed to serialize contracts")?;
        println!("{}", out);
        return Ok(());
    }

    for contract in contracts {
        print_contract(contract);
    }
    Ok(())
}

fn requirements(list: &[ArtifactRequirement]) -> String {
    if list.is_empty() {
        return "-".to_string();
    }
    list.iter()
        .map(|r| {
            if r.required {
                r.artifact_type.to_string()
            } else {
                format!("{}?", r.artifact_type)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_contract(contract: &AgentContract) {
    println!();
    println!(
        "{} {}",
        style(&contract.agent_id).bold().cyan(),
        style(format!("({})", contract.role)).dim()
    );
    println!("  inputs:    {}", requirements(&contract.inputs));
    println!("  outputs:   {}", requirements(&contract.outputs));
    if !contract.ownership.is_empty() {
        println!("  ownership:");
        for (artifact_type, level) in &contract.ownership {
            println!("    {:<20} {}", artifact_type.as_str(), level);
        }
    }
    for invariant in &contract.invariants {
        println!("  invariant: {}", invariant);
    }
    for forbidden in &contract.forbidden_actions {
        println!("  forbidden: {}", forbidden);
    }
}
