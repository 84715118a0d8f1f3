use super::{Section, wrapper};
use crate::core::errors::rules::{ErrorContext, Operation};
use crate::core::errors::{PatchError, Result};
use crate::core::hoc::{HocFault, Target, Value};
use crate::engine::interpreter::Interpreter;

wrapper!(
    /// A handle for navigating the tree around a section.
    SectionRef
);

impl Interpreter {
    /// A reference to `section`, or to the currently accessed section.
    pub fn section_ref(&mut self, section: Option<Section>) -> Result<SectionRef> {
        let section = match section {
            Some(section) => section,
            None => self.cas()?.ok_or_else(|| {
                PatchError::SectionStack(
                    "SectionRef() failed as there is no currently accessed section available. \
                     Please specify a Section."
                        .to_string(),
                )
            })?,
        };
        let value = self.transform(&section)?;
        let context = ErrorContext::new().with("object", "SectionRef");
        let id = self.instantiate("SectionRef", &[value], Operation::SectionAccess, &context)?;
        self.reference(id, section.0);
        Ok(SectionRef(id))
    }
}

impl SectionRef {
    fn read(
        self,
        interp: &Interpreter,
        name: &str,
        index: Option<usize>,
    ) -> Result<std::result::Result<Value, HocFault>> {
        let target = Target::Object(interp.handle(self.0)?);
        Ok(match index {
            Some(index) => interp.hoc().get_indexed(target, name, index),
            None => interp.hoc().get(target, name),
        })
    }

    pub fn section(self, interp: &mut Interpreter) -> Result<Section> {
        let value = self
            .read(interp, "sec", None)?
            .map_err(|fault| interp.read_fault(fault, &interp.describe(self.0), "sec"))?;
        interp.wrap_section(value)
    }

    pub fn child_count(self, interp: &Interpreter) -> Result<usize> {
        Ok(interp.number_attr(self.0, "nchild")? as usize)
    }

    /// The `index`-th child of the referenced section.
    pub fn child(self, interp: &mut Interpreter, index: usize) -> Result<Section> {
        let count = self.child_count(interp)?;
        if index >= count {
            return Err(PatchError::InvalidArgument(format!(
                "Child index {} out of range for a section with {} children",
                index, count
            )));
        }
        let value = self
            .read(interp, "child", Some(index))?
            .map_err(|fault| interp.read_fault(fault, &interp.describe(self.0), "child"))?;
        interp.wrap_section(value)
    }

    /// The parent of the referenced section, `None` for a root section.
    pub fn parent(self, interp: &mut Interpreter) -> Result<Option<Section>> {
        match self.read(interp, "parent", None)? {
            Ok(value) => interp.wrap_section(value).map(Some),
            Err(HocFault::Runtime { .. }) => Ok(None),
            Err(fault) => Err(interp.read_fault(fault, &interp.describe(self.0), "parent")),
        }
    }
}
