use std::collections::HashMap;

use uuid::Uuid;

use crate::{InvocationRecord, RecordValidity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Service,
    Method,
    History,
}

/// One node of the service -> method -> history tree. The whole tree is
/// rebuilt from scratch on every refresh and `id` is freshly generated
/// each time: bookkeeping that must survive a rebuild has to key off
/// `label` or `record.id`, never off `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub children: Vec<DirectoryNode>,
    pub record: Option<InvocationRecord>,
}

fn node_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Joins the discovered catalog with stored records into the directory
/// tree. Total and deterministic apart from node ids: unknown or missing
/// inputs just yield smaller trees. Only live records become history
/// entries, in the order the gateway returned them; a record whose
/// (service, method) was not discovered is dropped from the tree but stays
/// addressable by id through the flat record list.
pub fn build_directory(
    services: &[String],
    methods_by_service: &HashMap<String, Vec<String>>,
    records: &[InvocationRecord],
) -> Vec<DirectoryNode> {
    let mut histories: HashMap<(&str, &str), Vec<&InvocationRecord>> = HashMap::new();
    for record in records {
        if record.is_valid != RecordValidity::Valid {
            continue;
        }
        histories
            .entry((record.service.as_str(), record.method.as_str()))
            .or_default()
            .push(record);
    }

    services
        .iter()
        .map(|service| {
            let methods = methods_by_service
                .get(service)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let children = methods
                .iter()
                .map(|method| {
                    let entries = histories
                        .get(&(service.as_str(), method.as_str()))
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    DirectoryNode {
                        id: node_id(),
                        label: method.clone(),
                        kind: NodeKind::Method,
                        children: entries
                            .iter()
                            .map(|record| DirectoryNode {
                                id: node_id(),
                                label: record.name.clone(),
                                kind: NodeKind::History,
                                children: Vec::new(),
                                record: Some((*record).clone()),
                            })
                            .collect(),
                        record: None,
                    }
                })
                .collect();
            DirectoryNode {
                id: node_id(),
                label: service.clone(),
                kind: NodeKind::Service,
                children,
                record: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, service: &str, method: &str, valid: RecordValidity) -> InvocationRecord {
        InvocationRecord {
            id,
            port: 31802,
            service: service.to_string(),
            method: method.to_string(),
            name: format!("case-{id}"),
            json_params: "{}".to_string(),
            create_time: None,
            modify_time: None,
            is_valid: valid,
        }
    }

    fn catalog() -> (Vec<String>, HashMap<String, Vec<String>>) {
        let services = vec!["UserService".to_string(), "OrderService".to_string()];
        let mut methods = HashMap::new();
        methods.insert(
            "UserService".to_string(),
            vec!["getUserById".to_string(), "createUser".to_string()],
        );
        methods.insert("OrderService".to_string(), vec!["createOrder".to_string()]);
        (services, methods)
    }

    #[test]
    fn records_group_under_one_method_in_gateway_order() {
        let (services, methods) = catalog();
        let records = vec![
            record(3, "UserService", "getUserById", RecordValidity::Valid),
            record(1, "OrderService", "createOrder", RecordValidity::Valid),
            record(2, "UserService", "getUserById", RecordValidity::Valid),
        ];

        let tree = build_directory(&services, &methods, &records);
        let get_user = &tree[0].children[0];
        assert_eq!(get_user.label, "getUserById");
        let ids: Vec<i64> = get_user
            .children
            .iter()
            .map(|node| node.record.as_ref().unwrap().id)
            .collect();
        assert_eq!(ids, vec![3, 2]);

        let create_order = &tree[1].children[0];
        assert_eq!(create_order.children.len(), 1);
        assert_eq!(create_order.children[0].record.as_ref().unwrap().id, 1);
    }

    #[test]
    fn superseded_records_are_not_shown() {
        let (services, methods) = catalog();
        let records = vec![
            record(1, "UserService", "getUserById", RecordValidity::Superseded),
            record(2, "UserService", "getUserById", RecordValidity::Valid),
        ];

        let tree = build_directory(&services, &methods, &records);
        let entries = &tree[0].children[0].children;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record.as_ref().unwrap().id, 2);
    }

    #[test]
    fn orphan_records_are_dropped_from_the_tree() {
        let (services, methods) = catalog();
        let records = vec![record(
            1,
            "GoneService",
            "vanished",
            RecordValidity::Valid,
        )];

        let tree = build_directory(&services, &methods, &records);
        for service in &tree {
            for method in &service.children {
                assert!(method.children.is_empty());
            }
        }
    }

    #[test]
    fn service_without_discovered_methods_is_a_leaf() {
        let services = vec!["BareService".to_string()];
        let tree = build_directory(&services, &HashMap::new(), &[]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].kind, NodeKind::Service);
        assert!(tree[0].children.is_empty());
    }

    #[test]
    fn node_ids_are_not_stable_across_rebuilds() {
        let (services, methods) = catalog();
        let first = build_directory(&services, &methods, &[]);
        let second = build_directory(&services, &methods, &[]);
        assert_ne!(first[0].id, second[0].id);
        assert_eq!(first[0].label, second[0].label);
    }
}
