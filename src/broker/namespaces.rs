//! Namespace negotiation: from a proposal's requested capabilities to the
//! approved namespaces of a session.
//!
//! The wallet supports what the dApp lists as optional, plus the reserved
//! extension methods. Required namespaces must fit inside that set. The
//! approved set is what the dApp requested, restricted to what is supported,
//! so nothing the dApp did not ask for is ever granted.

use std::collections::BTreeMap;

use crate::error::BrokerError;
use crate::relay::{ApprovedNamespace, ProposalNamespace, ProposalParams};
use crate::wallet::Address;

/// Operator-side inputs to negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePolicy {
    /// RPC endpoint advertised for every approved chain.
    pub rpc_url: String,
    /// Extension methods the wallet supports beyond what dApps request.
    pub reserved_methods: Vec<String>,
}

impl NamespacePolicy {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            reserved_methods: vec!["anvil_sign".to_string()],
        }
    }
}

/// Capabilities for one namespace, order-preserving and deduplicated.
#[derive(Debug, Default)]
struct Capabilities {
    chains: Vec<String>,
    methods: Vec<String>,
    events: Vec<String>,
}

impl Capabilities {
    fn extend(&mut self, key: &str, namespace: &ProposalNamespace) {
        push_unique(&mut self.chains, chains_of(key, namespace));
        push_unique(&mut self.methods, namespace.methods.iter().cloned());
        push_unique(&mut self.events, namespace.events.iter().cloned());
    }
}

fn push_unique(target: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// Namespace name of a key: `eip155` for both `eip155` and `eip155:1`.
fn namespace_name(key: &str) -> &str {
    key.split(':').next().unwrap_or(key)
}

/// A key of the form `ns:ref` with no chains listed stands for that chain.
fn chains_of(key: &str, namespace: &ProposalNamespace) -> Vec<String> {
    if namespace.chains.is_empty() && key.contains(':') {
        vec![key.to_string()]
    } else {
        namespace.chains.clone()
    }
}

/// Chain reference: the last `:`-delimited segment of a chain id.
fn chain_reference(chain: &str) -> &str {
    chain.rsplit(':').next().unwrap_or(chain)
}

fn group(namespaces: &BTreeMap<String, ProposalNamespace>) -> BTreeMap<String, Capabilities> {
    let mut grouped: BTreeMap<String, Capabilities> = BTreeMap::new();
    for (key, namespace) in namespaces {
        grouped
            .entry(namespace_name(key).to_string())
            .or_default()
            .extend(key, namespace);
    }
    grouped
}

fn missing<'a>(requested: &'a [String], supported: &[String]) -> Vec<&'a str> {
    requested
        .iter()
        .filter(|item| !supported.contains(item))
        .map(String::as_str)
        .collect()
}

/// Build the approved namespaces for `params` on behalf of `address`.
pub fn negotiate(
    params: &ProposalParams,
    address: &Address,
    policy: &NamespacePolicy,
) -> Result<BTreeMap<String, ApprovedNamespace>, BrokerError> {
    let mut supported = group(&params.optional_namespaces);
    for capabilities in supported.values_mut() {
        push_unique(
            &mut capabilities.methods,
            policy.reserved_methods.iter().cloned(),
        );
    }

    let required = group(&params.required_namespaces);
    for (name, wanted) in &required {
        let Some(offered) = supported.get(name) else {
            return Err(BrokerError::NonConformingNamespaces(format!(
                "required namespace '{name}' is not supported"
            )));
        };
        let gaps = [
            ("chains", missing(&wanted.chains, &offered.chains)),
            ("methods", missing(&wanted.methods, &offered.methods)),
            ("events", missing(&wanted.events, &offered.events)),
        ];
        if let Some((field, items)) = gaps.iter().find(|(_, items)| !items.is_empty()) {
            return Err(BrokerError::NonConformingNamespaces(format!(
                "required {field} of '{name}' are not supported: {}",
                items.join(", ")
            )));
        }
    }

    let mut requested = group(&params.optional_namespaces);
    for (key, namespace) in &params.required_namespaces {
        requested
            .entry(namespace_name(key).to_string())
            .or_default()
            .extend(key, namespace);
    }

    let account = address.to_checksum();
    let approved = requested
        .into_iter()
        .filter_map(|(name, wanted)| {
            let offered = supported.get(&name)?;
            let keep = |items: Vec<String>, allowed: &[String]| -> Vec<String> {
                items.into_iter().filter(|i| allowed.contains(i)).collect()
            };
            let chains = keep(wanted.chains, &offered.chains);
            let accounts = chains
                .iter()
                .map(|chain| format!("{chain}:{account}"))
                .collect();
            let rpc_map = chains
                .iter()
                .map(|chain| (chain_reference(chain).to_string(), policy.rpc_url.clone()))
                .collect();
            Some((
                name,
                ApprovedNamespace {
                    methods: keep(wanted.methods, &offered.methods),
                    events: keep(wanted.events, &offered.events),
                    chains,
                    accounts,
                    rpc_map,
                },
            ))
        })
        .collect();

    Ok(approved)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use pretty_assertions::assert_eq;

    const RPC: &str = "http://127.0.0.1:8545";

    /// Every chain, method and event in `approved` appears somewhere in the
    /// proposal's requested namespaces.
    fn is_within_request(
        approved: &BTreeMap<String, ApprovedNamespace>,
        params: &ProposalParams,
    ) -> bool {
        let mut chains = BTreeSet::new();
        let mut methods = BTreeSet::new();
        let mut events = BTreeSet::new();
        for (key, namespace) in params
            .optional_namespaces
            .iter()
            .chain(params.required_namespaces.iter())
        {
            chains.extend(chains_of(key, namespace));
            methods.extend(namespace.methods.iter().cloned());
            events.extend(namespace.events.iter().cloned());
        }
        approved.values().all(|namespace| {
            namespace.chains.iter().all(|c| chains.contains(c))
                && namespace.methods.iter().all(|m| methods.contains(m))
                && namespace.events.iter().all(|e| events.contains(e))
        })
    }

    fn ns(chains: &[&str], methods: &[&str], events: &[&str]) -> ProposalNamespace {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        ProposalNamespace {
            chains: owned(chains),
            methods: owned(methods),
            events: owned(events),
        }
    }

    fn params(
        optional: Vec<(&str, ProposalNamespace)>,
        required: Vec<(&str, ProposalNamespace)>,
    ) -> ProposalParams {
        ProposalParams {
            optional_namespaces: optional
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            required_namespaces: required
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            ..ProposalParams::default()
        }
    }

    fn address() -> Address {
        Address::parse("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap()
    }

    #[test]
    fn builds_accounts_and_rpc_map_per_chain() {
        let params = params(
            vec![(
                "eip155",
                ns(
                    &["eip155:1", "eip155:137"],
                    &["eth_sendTransaction"],
                    &["chainChanged"],
                ),
            )],
            vec![],
        );

        let approved = negotiate(&params, &address(), &NamespacePolicy::new(RPC)).unwrap();
        let eip155 = &approved["eip155"];

        assert_eq!(
            eip155.accounts,
            vec![
                "eip155:1:0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
                "eip155:137:0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
            ]
        );
        assert_eq!(eip155.rpc_map["1"], RPC);
        assert_eq!(eip155.rpc_map["137"], RPC);
        assert_eq!(eip155.methods, vec!["eth_sendTransaction".to_string()]);
        assert_eq!(eip155.events, vec!["chainChanged".to_string()]);
    }

    #[test]
    fn reserved_method_is_granted_only_when_requested() {
        let policy = NamespacePolicy::new(RPC);
        let without = params(
            vec![("eip155", ns(&["eip155:1"], &["personal_sign"], &[]))],
            vec![],
        );
        let approved = negotiate(&without, &address(), &policy).unwrap();
        assert!(!approved["eip155"].methods.contains(&"anvil_sign".to_string()));

        let with = params(
            vec![("eip155", ns(&["eip155:1"], &["personal_sign"], &[]))],
            vec![("eip155", ns(&["eip155:1"], &["anvil_sign"], &[]))],
        );
        let approved = negotiate(&with, &address(), &policy).unwrap();
        assert_eq!(
            approved["eip155"].methods,
            vec!["personal_sign".to_string(), "anvil_sign".to_string()]
        );
    }

    #[test]
    fn unsatisfiable_required_namespace_is_rejected() {
        let policy = NamespacePolicy::new(RPC);

        let unknown_namespace = params(
            vec![("eip155", ns(&["eip155:1"], &[], &[]))],
            vec![("solana", ns(&["solana:mainnet"], &[], &[]))],
        );
        assert!(matches!(
            negotiate(&unknown_namespace, &address(), &policy),
            Err(BrokerError::NonConformingNamespaces(_))
        ));

        let extra_chain = params(
            vec![("eip155", ns(&["eip155:1"], &[], &[]))],
            vec![("eip155", ns(&["eip155:10"], &[], &[]))],
        );
        let err = negotiate(&extra_chain, &address(), &policy).unwrap_err();
        assert!(err.to_string().contains("eip155:10"));

        let extra_method = params(
            vec![("eip155", ns(&["eip155:1"], &["personal_sign"], &[]))],
            vec![("eip155", ns(&["eip155:1"], &["eth_sign"], &[]))],
        );
        assert!(negotiate(&extra_method, &address(), &policy).is_err());
    }

    #[test]
    fn chain_keyed_namespace_without_chains_stands_for_itself() {
        let params = params(vec![("eip155:10", ns(&[], &["personal_sign"], &[]))], vec![]);
        let approved = negotiate(&params, &address(), &NamespacePolicy::new(RPC)).unwrap();

        assert_eq!(approved["eip155"].chains, vec!["eip155:10".to_string()]);
        assert_eq!(approved["eip155"].rpc_map["10"], RPC);
    }

    #[test]
    fn namespace_without_chains_yields_empty_accounts() {
        let params = params(vec![("eip155", ns(&[], &["personal_sign"], &[]))], vec![]);
        let approved = negotiate(&params, &address(), &NamespacePolicy::new(RPC)).unwrap();

        assert!(approved["eip155"].accounts.is_empty());
        assert!(approved["eip155"].rpc_map.is_empty());
    }

    #[test]
    fn empty_proposal_yields_empty_approval() {
        let approved = negotiate(
            &ProposalParams::default(),
            &address(),
            &NamespacePolicy::new(RPC),
        )
        .unwrap();
        assert!(approved.is_empty());
    }

    #[test]
    fn never_grants_beyond_request() {
        let policy = NamespacePolicy {
            rpc_url: RPC.to_string(),
            reserved_methods: vec!["anvil_sign".to_string(), "wallet_custom".to_string()],
        };
        let cases = [
            params(
                vec![(
                    "eip155",
                    ns(&["eip155:1", "eip155:5"], &["eth_sendTransaction"], &["accountsChanged"]),
                )],
                vec![],
            ),
            params(
                vec![("eip155", ns(&["eip155:1"], &["personal_sign", "eth_sign"], &[]))],
                vec![("eip155", ns(&["eip155:1"], &["personal_sign", "anvil_sign"], &[]))],
            ),
            params(vec![("eip155:42161", ns(&[], &[], &["chainChanged"]))], vec![]),
        ];

        for case in &cases {
            let approved = negotiate(case, &address(), &policy).unwrap();
            assert!(is_within_request(&approved, case), "over-grant for {case:?}");
            assert!(
                !approved
                    .values()
                    .any(|n| n.methods.contains(&"wallet_custom".to_string()))
            );
        }
    }
}
