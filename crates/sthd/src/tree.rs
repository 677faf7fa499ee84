//! The in-memory filesystem model.
//!
//! Every partition owns one [`DirNode`] root. Nodes are inserted by
//! backslash-separated paths; missing intermediate directories are
//! created on the way, stamped with the inserted node's timestamp.
//! Children keep insertion order, and inserting an existing name
//! replaces the old node in place.

use crate::structures::{ShortName, time::DosDateTime};
use crate::{Error, Result};

/// Directory nesting the builder accepts. TOS menus never go anywhere
/// near this deep.
const MAX_DEPTH: usize = 8;

#[derive(Debug, Clone)]
pub struct FileNode {
    pub name: ShortName,
    pub data: Vec<u8>,
    pub stamp: DosDateTime,
}

#[derive(Debug, Clone)]
pub struct DirNode {
    pub name: ShortName,
    pub stamp: DosDateTime,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone)]
pub enum Node {
    File(FileNode),
    Dir(DirNode),
}

impl Node {
    pub fn file(name: ShortName, data: Vec<u8>, stamp: DosDateTime) -> Self {
        Self::File(FileNode { name, data, stamp })
    }

    pub fn dir(name: ShortName, stamp: DosDateTime) -> Self {
        Self::Dir(DirNode {
            name,
            stamp,
            children: Vec::new(),
        })
    }

    pub fn name(&self) -> &ShortName {
        match self {
            Self::File(f) => &f.name,
            Self::Dir(d) => &d.name,
        }
    }

    pub fn stamp(&self) -> DosDateTime {
        match self {
            Self::File(f) => f.stamp,
            Self::Dir(d) => d.stamp,
        }
    }

    pub fn as_dir(&self) -> Option<&DirNode> {
        match self {
            Self::Dir(d) => Some(d),
            Self::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Self::File(f) => Some(f),
            Self::Dir(_) => None,
        }
    }
}

/// Splits a backslash path into validated short names. Empty
/// components (doubled or trailing backslashes) are dropped.
pub fn split_path(path: &str) -> Result<Vec<ShortName>> {
    let components = path
        .split('\\')
        .filter(|c| !c.is_empty())
        .map(ShortName::parse)
        .collect::<Result<Vec<_>>>()?;
    if components.len() > MAX_DEPTH {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(components)
}

impl DirNode {
    /// The root of a partition. Its name is never surfaced.
    pub fn root() -> Self {
        Self {
            name: ShortName::coerce("ROOT"),
            stamp: DosDateTime::now(),
            children: Vec::new(),
        }
    }

    pub fn child(&self, name: &ShortName) -> Option<&Node> {
        self.children.iter().find(|c| c.name() == name)
    }

    fn child_dir_mut(&mut self, name: &ShortName) -> Option<&mut Node> {
        self.children.iter_mut().find(|c| *c.name() == *name)
    }

    /// Inserts `node` at `path` (which must end with the node's own
    /// name). Missing directories are created with the node's stamp; a
    /// file in the way is `NotADirectory`.
    pub fn insert(&mut self, path: &str, node: Node) -> Result<()> {
        let components = split_path(path)?;
        let Some((last, dirs)) = components.split_last() else {
            return Err(Error::InvalidPath(path.to_string()));
        };
        if last != node.name() {
            return Err(Error::InvalidPath(path.to_string()));
        }
        let stamp = node.stamp();
        let mut cursor = self;
        for name in dirs {
            if cursor.child(name).is_none() {
                cursor.children.push(Node::dir(*name, stamp));
            }
            cursor = match cursor.child_dir_mut(name).unwrap() {
                Node::Dir(d) => d,
                Node::File(f) => {
                    return Err(Error::NotADirectory(f.name.to_string()));
                }
            };
        }
        match cursor.children.iter_mut().position(|c| c.name() == last) {
            // Duplicate names replace in place, keeping the slot order
            Some(i) => cursor.children[i] = node,
            None => cursor.children.push(node),
        }
        Ok(())
    }

    /// Resolves a backslash path to a node.
    pub fn lookup(&self, path: &str) -> Option<&Node> {
        let components = split_path(path).ok()?;
        let (last, dirs) = components.split_last()?;
        let mut cursor = self;
        for name in dirs {
            cursor = cursor.child(name)?.as_dir()?;
        }
        cursor.child(last)
    }

    /// Visits every node below this directory in depth-first insertion
    /// order, handing the visitor the full backslash path.
    pub fn walk(&self, visitor: &mut dyn FnMut(&str, &Node)) {
        fn recurse(dir: &DirNode, prefix: &str, visitor: &mut dyn FnMut(&str, &Node)) {
            for child in &dir.children {
                let path = if prefix.is_empty() {
                    child.name().to_string()
                } else {
                    format!("{prefix}\\{}", child.name())
                };
                visitor(&path, child);
                if let Node::Dir(sub) = child {
                    recurse(sub, &path, visitor);
                }
            }
        }
        recurse(self, "", visitor);
    }

    /// Total number of files, directories, and payload bytes below
    /// this directory.
    pub fn statistics(&self) -> (usize, usize, usize) {
        let (mut files, mut dirs, mut bytes) = (0, 0, 0);
        self.walk(&mut |_, node| match node {
            Node::File(f) => {
                files += 1;
                bytes += f.data.len();
            }
            Node::Dir(_) => dirs += 1,
        });
        (files, dirs, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stamp() -> DosDateTime {
        DosDateTime::pack(1989, 6, 15, 12, 0, 0)
    }

    fn file(name: &str) -> Node {
        Node::file(ShortName::parse(name).unwrap(), b"x".to_vec(), stamp())
    }

    #[test]
    fn insert_creates_intermediate_directories() {
        let mut root = DirNode::root();
        root.insert("GAMES\\FOO\\RUNME.TOS", file("RUNME.TOS")).unwrap();

        let games = root.lookup("GAMES").unwrap().as_dir().unwrap();
        assert_eq!(games.stamp, stamp());
        assert!(root.lookup("GAMES\\FOO\\RUNME.TOS").unwrap().as_file().is_some());
        assert!(root.lookup("GAMES\\BAR").is_none());
    }

    #[test]
    fn lowercase_paths_are_uppercased() {
        let mut root = DirNode::root();
        root.insert("games\\foo.prg", file("FOO.PRG")).unwrap();
        assert!(root.lookup("GAMES\\FOO.PRG").is_some());
    }

    #[test]
    fn duplicate_insert_replaces_in_place() {
        let mut root = DirNode::root();
        root.insert("A.TXT", file("A.TXT")).unwrap();
        root.insert("B.TXT", file("B.TXT")).unwrap();
        let replacement = Node::file(
            ShortName::parse("A.TXT").unwrap(),
            b"longer".to_vec(),
            stamp(),
        );
        root.insert("A.TXT", replacement).unwrap();

        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].name().to_string(), "A.TXT");
        assert_eq!(root.children[0].as_file().unwrap().data, b"longer");
    }

    #[test]
    fn file_in_the_way_is_rejected() {
        let mut root = DirNode::root();
        root.insert("GAMES", file("GAMES")).unwrap();
        let err = root.insert("GAMES\\FOO.PRG", file("FOO.PRG")).unwrap_err();
        assert!(matches!(err, Error::NotADirectory(_)));
    }

    #[test]
    fn walk_visits_in_insertion_order() {
        let mut root = DirNode::root();
        root.insert("B\\ONE.PRG", file("ONE.PRG")).unwrap();
        root.insert("A.TXT", file("A.TXT")).unwrap();
        root.insert("B\\TWO.PRG", file("TWO.PRG")).unwrap();

        let mut seen = Vec::new();
        root.walk(&mut |path, _| seen.push(path.to_string()));
        assert_eq!(seen, ["B", "B\\ONE.PRG", "B\\TWO.PRG", "A.TXT"]);
    }

    #[test]
    fn statistics_count_all_nodes() {
        let mut root = DirNode::root();
        root.insert("B\\ONE.PRG", file("ONE.PRG")).unwrap();
        root.insert("A.TXT", file("A.TXT")).unwrap();
        assert_eq!(root.statistics(), (2, 1, 2));
    }
}
