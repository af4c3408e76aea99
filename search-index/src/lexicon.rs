//! Word knowledge feeding the fuzzy-match throttle.
//!
//! A query whose words all look well-formed probably does not need fuzzy
//! matching, so its fuzzy hypotheses get half weight. A query containing a
//! stopword, or a word we do not recognize, gets full-weight fuzzy matching.

use std::collections::HashSet;

/// What the engine needs to know about individual query words. Hosts with a
/// real dictionary can supply their own implementation.
pub trait Lexicon: Send + Sync {
    fn is_stopword(&self, word: &str) -> bool;
    /// Whether `word` passes a spellcheck-like plausibility test.
    fn is_recognized(&self, word: &str) -> bool;
}

/// The stopword list used by the index's `english` analyzer.
const STOPWORDS: [&str; 33] = [
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

// A compact common-English vocabulary. Deliberately approximate: an
// unrecognized word only promotes fuzzy hypotheses to full weight, it never
// changes which documents can match.
const COMMON_WORDS: &str = "\
about above across act add after again against age ages ago air all almost \
alone along already also always am america among amount ancient angel animal \
animals another answer any anyone anything appear apple area arm army around \
art ask author away baby back bad ball bank base battle bear beautiful became \
because become bed been before began begin behind being believe bell belong \
below best better between big bird birds black blood blue boat bodies body \
book books born both box boy boys bread break bright bring broken brother \
brought brown build building built burn business call came can cannot canoe \
captain car care carry case cat catch cause center certain chance change \
chapter character charge chief child children choose church circle cities \
city class classic classics clean clear close cloth clothes cloud coast cold \
collection college color come common company complete condition consider \
contain continue cook cool corn could count country course cover cross crowd \
cry current cut dance danger dark daughter day days dead deal dear death \
decide deep desert design desire dick did die difference different difficult \
dinner direction discover distance divide do doctor does dog dogs dollar done \
door doubt down draw dream dress drink drive drop dry duck during dust duty \
each ear early earth east easy eat edge effect egg eight either electric \
element else end enemy energy engine enough enter entire equal escape europe \
even evening event ever every everyone everything exact example except \
exciting exercise expect experience explain express eye eyes face fact fair \
fall family famous far farm fast father fear feed feel feet fell felt few \
field fight figure fill final find fine finger finish fire first fish fit \
five floor flower fly follow food foot force forest forever forget form \
forward found four free fresh friend friends from front fruit full fun future \
game garden gas gave general gentle get girl girls give glad glass go god \
gold gone good got government grade great green grew ground group grow guess \
gun had hair half hand happen happened happy hard has have he head hear heard \
heart heat heavy held help her here herself high hill him himself his history \
hold home hope horse hot hour house how however huge human hundred hunt \
hunter hurry hurt husband ice idea important inch include indeed indicate \
industry information insect inside instead interest iron island its itself \
job join journey joy jump just keep kept key kill kind king knew know known \
lady lake land language large last late laugh law lay lead learn least leave \
left leg length less let letter level library lie life lift light like line \
list listen little live long look lost lot loud love low machine made magic \
main make man many map mark market master match material matter may me mean \
measure meat meet member memory men metal middle might mile milk million mind \
mine minute miss modern moment money month moon more morning most mother \
mountain mouth move much music must my mystery name nation natural nature \
near necessary neck need never new next night nine noise north nose note \
nothing notice noun now number object observe ocean off office often oh oil \
old once one only open opposite order other our out outside over own page \
paint pair paper paragraph parent part party pass past pattern pay people \
perhaps period person phrase pick picture piece place plain plan plane plant \
play please pleasure poem point poor position possible pound power practice \
prepare present president press pretty price pride prince princess print \
probable probably problem process produce product promise property protect \
proud prove provide public pull push put quality queen question quick quiet \
quite race radio rain raise ran reach read ready real really reason receive \
record red region remember repeat reply represent require rest result return \
rich ride right ring rise river road rock roll romance room rope rose round \
row rule run running sail salt same sand sat save saw say school science \
score sea search season seat second secret section see seem seen self sell \
send sense sent sentence separate serve set settle seven several shall shape \
share sharp she ship shoe shop shore short should shoulder shout show side \
sight sign silent silver similar simple since sing single sister sit six size \
skin sky sleep slow small smell smile snow so soft soil soldier some someone \
something sometimes son song soon sound south space speak special speed spell \
spend spot spread spring square stand star start state statement station stay \
steel step stick still stone stood stop store story strange stream street \
stretch string strong student study subject substance succeed success sudden \
suffer suggest summer sun supply suppose sure surface surprise swim syllable \
symbol system table tail take talk tall teach teacher team tell temperature \
ten term test than thank them themselves thick thin thing think third those \
though thought thousand three through thus tie time tiny today together told \
tone too took tool top total touch toward town track trade train travel tree \
trip trouble true try turn twenty two type under understand unit until up \
upon us use usual valley value vampire various verb very view village visit \
voice vowel wait walk wall want war warm wash watch water wave way we wear \
weather week weight well went were west whale what wheel when where whether \
which while white who whole whose why wide wife wild win wind window wing \
winter wish woman women wonder wood word words work world would write written \
wrong wrote yard year years yes yet you young your";

/// Built-in lexicon: the analyzer's stopword list plus a common-words
/// vocabulary.
pub struct EnglishLexicon {
    stopwords: HashSet<&'static str>,
    words: HashSet<&'static str>,
}

impl Default for EnglishLexicon {
    fn default() -> Self {
        Self {
            stopwords: STOPWORDS.iter().copied().collect(),
            words: COMMON_WORDS.split_whitespace().collect(),
        }
    }
}

impl Lexicon for EnglishLexicon {
    fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(word)
    }

    fn is_recognized(&self, word: &str) -> bool {
        self.stopwords.contains(word) || self.words.contains(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopwords_are_recognized_words() {
        let lexicon = EnglishLexicon::default();
        assert!(lexicon.is_stopword("the"));
        assert!(lexicon.is_recognized("the"));
        assert!(!lexicon.is_stopword("whale"));
        assert!(lexicon.is_recognized("whale"));
    }

    #[test]
    fn nonsense_words_are_unrecognized() {
        let lexicon = EnglishLexicon::default();
        assert!(!lexicon.is_recognized("xlomph"));
        assert!(!lexicon.is_stopword("xlomph"));
    }
}
